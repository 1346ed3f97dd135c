//! Interactive terminal front end: screens, transport and the admin dialog.

use crate::commands::{parse_command, AdminCommand, Command, LibrarySection, HELP};
use crate::media::probe_duration;
use crate::routes::{render_nav, Route};
use crate::views;
use chrono::{Local, Timelike, Utc};
use nebula_core::haptics::NAVIGATION_PULSE_MS;
use nebula_core::session::save_session;
use nebula_core::{
    search_songs, AccessResult, AdminPanel, Catalog, CoreError, Haptics, MediaFile, PlayerHandle,
    Preferences, SaveOutcome, SessionManager, Song, Translations, HOME_SONG_LIMIT,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const LOG_TARGET: &str = "nebula::shell";

/// Everything the shell needs to serve commands
pub struct Shell {
    player: PlayerHandle,
    catalog: Catalog,
    sessions: SessionManager,
    admin: AdminPanel,
    haptics: Arc<dyn Haptics>,
    preferences: Preferences,
    session_path: PathBuf,
    route: Route,
    /// Songs of the last list shown; `play <n>` indexes into it
    listing: Vec<Song>,
    /// All songs by title, loaded on the first search
    search_cache: Option<Vec<Song>>,
    admin_open: bool,
    show_lyrics: bool,
}

impl Shell {
    pub fn new(
        player: PlayerHandle,
        catalog: Catalog,
        sessions: SessionManager,
        admin: AdminPanel,
        haptics: Arc<dyn Haptics>,
        preferences: Preferences,
        session_path: PathBuf,
    ) -> Self {
        Self {
            player,
            catalog,
            sessions,
            admin,
            haptics,
            preferences,
            session_path,
            route: Route::Home,
            listing: Vec::new(),
            search_cache: None,
            admin_open: false,
            show_lyrics: false,
        }
    }

    fn t(&self) -> &'static Translations {
        self.preferences.language.translations()
    }

    /// Read commands from stdin until `quit`, EOF or cancellation
    pub async fn run(mut self, cancel_token: CancellationToken) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        self.show_route().await;
        println!("{}", render_nav(self.route, self.t()));

        loop {
            let line = tokio::select! {
                () = cancel_token.cancelled() => break,
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!(target: LOG_TARGET, "Failed to read input: {}", e);
                    break;
                }
            };

            match parse_command(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => {
                    debug!(target: LOG_TARGET, "Command: {:?}", command);
                    self.execute(command).await;
                }
                Ok(None) => {}
                Err(message) => println!("{message}"),
            }
        }

        info!(target: LOG_TARGET, "Shell closed");
    }

    async fn execute(&mut self, command: Command) {
        let result = match command {
            Command::Go(route) => {
                self.navigate(route).await;
                Ok(())
            }
            Command::Search(query) => self.search(&query).await,
            Command::Library(section) => self.library(section).await,
            Command::Play(n) => self.with_listed(n, |shell, _| {
                shell.player.play_queue(shell.listing.clone(), n - 1)
            }),
            Command::Enqueue(n) => self.with_listed(n, |shell, song| shell.player.add_to_queue(song)),
            Command::Favorite(n) => self.favorite(n).await,
            Command::Toggle => self.player.toggle_play(),
            Command::Next => self.player.next_song(),
            Command::Previous => self.player.previous_song(),
            Command::Seek(position) => self.player.seek_to(position),
            Command::Volume(volume) => self.player.set_volume(volume),
            Command::Shuffle => self.player.toggle_shuffle(),
            Command::Repeat => self.player.toggle_repeat(),
            Command::Fullscreen(on) => self.player.set_fullscreen(on),
            Command::Lyrics => {
                self.show_lyrics = !self.show_lyrics;
                self.now_playing();
                Ok(())
            }
            Command::Now => {
                self.now_playing();
                Ok(())
            }
            Command::Language(language) => {
                self.preferences.language = language;
                self.preferences.save();
                println!("{}: {}", self.t().language, language.native_name());
                Ok(())
            }
            Command::Login { email, password } => self.login(&email, &password).await,
            Command::Signup { email, password } => self.signup(&email, &password).await,
            Command::Logout => self.logout().await,
            Command::Rename(name) => self.rename(&name).await,
            Command::Admin(command) => self.admin(command).await,
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Quit => Ok(()),
        };

        if let Err(e) = result {
            report(&e);
        }
    }

    /// Run `action` on the `n`th listed song (1-based)
    fn with_listed(
        &self,
        n: usize,
        action: impl FnOnce(&Self, Song) -> nebula_core::Result<()>,
    ) -> nebula_core::Result<()> {
        let Some(song) = self.listing.get(n - 1).cloned() else {
            println!("No song #{n} in the current list");
            return Ok(());
        };
        action(self, song)
    }

    async fn navigate(&mut self, route: Route) {
        self.haptics.pulse(NAVIGATION_PULSE_MS);

        if route.requires_session() && self.sessions.current_session().await.is_none() {
            println!("Sign in to see your library: login <email> <password>");
            self.route = Route::Auth;
        } else {
            self.route = route;
        }

        self.show_route().await;
        println!("{}", render_nav(self.route, self.t()));
    }

    async fn show_route(&mut self) {
        let result = match self.route {
            Route::Home => self.home().await,
            Route::Search => self.search("").await,
            Route::Library => self.library(LibrarySection::default()).await,
            Route::Profile => self.profile().await,
            Route::Auth => {
                println!("login <email> <password>  |  signup <email> <password>");
                Ok(())
            }
        };
        if let Err(e) = result {
            report(&e);
        }
    }

    fn show_list(&mut self, songs: Vec<Song>) {
        println!("{}", views::song_list(&songs, self.t()));
        self.listing = songs;
    }

    async fn home(&mut self) -> nebula_core::Result<()> {
        println!("{}", views::home_header(self.t(), Local::now().hour()));
        let songs = self.catalog.recent_songs(HOME_SONG_LIMIT).await?;
        self.show_list(songs);
        Ok(())
    }

    async fn search(&mut self, query: &str) -> nebula_core::Result<()> {
        self.route = Route::Search;
        let all = match self.search_cache.take() {
            Some(songs) => songs,
            None => self.catalog.songs_by_title().await?,
        };
        let found = search_songs(&all, query);
        self.search_cache = Some(all);
        self.show_list(found);
        Ok(())
    }

    async fn library(&mut self, section: LibrarySection) -> nebula_core::Result<()> {
        let Some(session) = self.sessions.current_session().await else {
            self.route = Route::Auth;
            return Err(CoreError::NotSignedIn);
        };
        self.route = Route::Library;
        let user_id = session.user.id;
        let t = self.t();

        match section {
            LibrarySection::Favorites => {
                println!("{}", t.favorites);
                let songs = self.catalog.favorites(&user_id).await?;
                self.show_list(songs);
            }
            LibrarySection::History => {
                println!("{}", t.history);
                let songs = self.catalog.history(&user_id).await?;
                self.show_list(songs);
            }
            LibrarySection::Playlists => {
                println!("{}", t.playlists);
                let playlists = self.catalog.playlists(&user_id).await?;
                if playlists.is_empty() {
                    println!("-");
                }
                for playlist in playlists {
                    println!("  {}", playlist.name);
                }
            }
        }
        Ok(())
    }

    async fn profile(&mut self) -> nebula_core::Result<()> {
        let t = self.t();
        println!("{}\n{}", t.profile, t.your_music);

        if self.sessions.current_session().await.is_some() {
            let profile = self.sessions.profile().await?;
            println!(
                "{}  listened {}",
                profile.display_name.as_deref().unwrap_or("-"),
                views::listen_time(profile.total_listen_seconds)
            );
        }

        let stats = self.catalog.library_stats().await?;
        println!("{}", views::library_stats(&stats, t));
        println!(
            "{}: {}   {}: admin",
            t.language,
            self.preferences.language.native_name(),
            t.settings
        );
        Ok(())
    }

    async fn favorite(&mut self, n: usize) -> nebula_core::Result<()> {
        let session = self
            .sessions
            .current_session()
            .await
            .ok_or(CoreError::NotSignedIn)?;
        let Some(song) = self.listing.get(n - 1) else {
            println!("No song #{n} in the current list");
            return Ok(());
        };

        let now_favorite = self.catalog.toggle_favorite(&session.user.id, &song.id).await?;
        let verb = if now_favorite { "added to" } else { "removed from" };
        println!("{} {verb} {}", song.title, self.t().favorites);
        Ok(())
    }

    fn now_playing(&self) {
        let state = self.player.state();
        if !state.has_song() {
            println!("Nothing playing");
            return;
        }
        if state.is_fullscreen {
            println!("{}", views::fullscreen_player(&state, self.show_lyrics));
        } else if let Some(line) = views::mini_player(&state) {
            println!("{line}");
            if self.show_lyrics {
                if let Some(lyric) = state.current_lyric() {
                    println!("  {lyric}");
                }
            }
        }
    }

    async fn login(&mut self, email: &str, password: &str) -> nebula_core::Result<()> {
        let session = self.sessions.sign_in(email, password).await?;
        save_session(&self.session_path, Some(&session));
        println!("Welcome back, {email}");
        self.navigate(Route::Home).await;
        Ok(())
    }

    async fn signup(&mut self, email: &str, password: &str) -> nebula_core::Result<()> {
        match self.sessions.sign_up(email, password).await? {
            Some(session) => {
                save_session(&self.session_path, Some(&session));
                println!("Account created, you are signed in");
                self.navigate(Route::Home).await;
            }
            None => println!("Check your inbox to confirm {email}, then log in"),
        }
        Ok(())
    }

    async fn logout(&mut self) -> nebula_core::Result<()> {
        let result = self.sessions.sign_out().await;
        save_session(&self.session_path, None);
        self.navigate(Route::Home).await;
        result
    }

    async fn rename(&mut self, name: &str) -> nebula_core::Result<()> {
        let profile = self.sessions.rename(name, Utc::now()).await?;
        println!(
            "Display name is now {}",
            profile.display_name.unwrap_or_default()
        );
        Ok(())
    }

    async fn admin(&mut self, command: AdminCommand) -> nebula_core::Result<()> {
        match &command {
            AdminCommand::Open => {
                if self.route != Route::Profile {
                    println!("The admin panel opens from the profile settings");
                    return Ok(());
                }
                if !self.admin.gate().is_enabled() {
                    println!("The admin panel is disabled (no credentials configured)");
                    return Ok(());
                }
                self.admin_open = true;
                println!("{}: admin pin <code>", self.t().admin_panel);
                return Ok(());
            }
            AdminCommand::Close => {
                self.admin.close();
                self.admin_open = false;
                return Ok(());
            }
            _ if !self.admin_open => {
                println!("Open the admin panel from the profile first");
                return Ok(());
            }
            AdminCommand::Pin(code) => return self.admin_unlock(code.clone()).await,
            _ if !self.admin.is_authenticated() => {
                println!("Enter the admin code first: admin pin <code>");
                return Ok(());
            }
            _ => {}
        }

        match command {
            AdminCommand::List => self.admin_list(),
            AdminCommand::New => {
                self.admin.start_new();
                println!("New song: set title, artist and audio, then 'admin save'");
            }
            AdminCommand::Edit(n) => {
                let Some(song) = self.admin.songs().get(n - 1).cloned() else {
                    println!("No song #{n}");
                    return Ok(());
                };
                self.admin.start_edit(&song);
                println!("Editing {}", song.title);
            }
            AdminCommand::Title(title) => self.admin.draft.title = title,
            AdminCommand::Artist(artist) => self.admin.draft.artist = artist,
            AdminCommand::Audio(path) => {
                let file = read_media(&path).await?;
                let duration = probe_in_background(file.bytes.clone()).await;
                self.admin.draft.audio = Some(match duration {
                    Some(seconds) => file.with_duration(seconds),
                    None => file,
                });
            }
            AdminCommand::Cover(path) => self.admin.draft.cover = Some(read_media(&path).await?),
            AdminCommand::Lyrics(path) => {
                self.admin.draft.lyrics_text = tokio::fs::read_to_string(&path).await?;
            }
            AdminCommand::Save => {
                let outcome = self.admin.save().await?;
                match outcome {
                    SaveOutcome::Created => println!("Song added"),
                    SaveOutcome::Updated => println!("Song updated"),
                }
                self.search_cache = None;
                self.admin_list();
            }
            AdminCommand::Delete(n) => {
                let Some(song) = self.admin.songs().get(n - 1).cloned() else {
                    println!("No song #{n}");
                    return Ok(());
                };
                self.admin.delete(&song).await?;
                self.search_cache = None;
                println!("Deleted {}", song.title);
            }
            AdminCommand::Open | AdminCommand::Close | AdminCommand::Pin(_) => {}
        }
        Ok(())
    }

    async fn admin_unlock(&mut self, code: String) -> nebula_core::Result<()> {
        self.admin.input = code;
        match self.admin.submit() {
            AccessResult::Granted => {
                println!("Access granted");
                self.admin.refresh().await?;
                self.admin_list();
            }
            AccessResult::Denied {
                attempts,
                max_attempts,
            } => println!("Wrong code ({attempts}/{max_attempts})"),
            AccessResult::LockedOut { retry_after } => {
                println!("Too many attempts, retry in {}s", retry_after.as_secs().max(1));
            }
        }
        Ok(())
    }

    fn admin_list(&self) {
        println!("{}", views::song_list(self.admin.songs(), self.t()));
    }
}

fn report(error: &CoreError) {
    match error {
        CoreError::Validation { .. }
        | CoreError::AuthFailed(_)
        | CoreError::NotSignedIn
        | CoreError::NameChangeCooldown { .. } => println!("{error}"),
        other => {
            error!(target: LOG_TARGET, "{}", other);
            println!("Something went wrong: {other}");
        }
    }
}

fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(content_type)
}

async fn read_media(path: &Path) -> nebula_core::Result<MediaFile> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());

    let file = MediaFile::new(name, bytes);
    Ok(match content_type_for(path) {
        Some(content_type) => file.with_content_type(content_type),
        None => file,
    })
}

async fn probe_in_background(bytes: Vec<u8>) -> Option<u32> {
    tokio::task::spawn_blocking(move || probe_duration(bytes))
        .await
        .ok()
        .flatten()
}
