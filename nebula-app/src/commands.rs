//! Parsing of shell input lines.

use crate::routes::Route;
use nebula_core::Language;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibrarySection {
    #[default]
    Favorites,
    Playlists,
    History,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Open,
    Pin(String),
    List,
    New,
    Edit(usize),
    Title(String),
    Artist(String),
    Audio(PathBuf),
    Cover(PathBuf),
    Lyrics(PathBuf),
    Save,
    Delete(usize),
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Go(Route),
    Search(String),
    Library(LibrarySection),
    /// 1-based position in the last list shown
    Play(usize),
    Enqueue(usize),
    Favorite(usize),
    Toggle,
    Next,
    Previous,
    Seek(Duration),
    /// 0.0 ..= 1.0
    Volume(f32),
    Shuffle,
    Repeat,
    Fullscreen(bool),
    Lyrics,
    Now,
    Language(Language),
    Login { email: String, password: String },
    Signup { email: String, password: String },
    Logout,
    Rename(String),
    Admin(AdminCommand),
    Help,
    Quit,
}

pub const HELP: &str = "\
navigation:  home | search [text] | library [favorites|playlists|history] | profile | go <path>
playback:    play <n> | queue <n> | toggle | next | prev | seek <m:ss> | vol <0-100>
             shuffle | repeat | full | mini | lyrics | now | fav <n>
account:     login <email> <password> | signup <email> <password> | logout | rename <name>
settings:    lang <it|en|fr>
admin:       admin (from profile) | admin pin <code> | admin list | admin new | admin edit <n>
             admin title <text> | admin artist <text> | admin audio <file> | admin cover <file>
             admin lyrics <file> | admin save | admin delete <n> | admin close
             help | quit";

/// `m:ss` or plain seconds
#[must_use]
pub fn parse_position(input: &str) -> Option<Duration> {
    let input = input.trim();
    if let Some((minutes, seconds)) = input.split_once(':') {
        let minutes: u64 = minutes.parse().ok()?;
        let seconds: u64 = seconds.parse().ok()?;
        if seconds >= 60 {
            return None;
        }
        return Some(Duration::from_secs(minutes * 60 + seconds));
    }
    input.parse().ok().map(Duration::from_secs)
}

fn parse_index(arg: &str) -> Result<usize, String> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("expected a song number, got '{arg}'")),
    }
}

fn credentials(rest: &str) -> Result<(String, String), String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(email), Some(password)) => Ok((email.to_string(), password.to_string())),
        _ => Err("usage: <email> <password>".to_string()),
    }
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest)
    }
}

fn parse_admin(rest: &str) -> Result<AdminCommand, String> {
    let (verb, arg) = split_verb(rest);
    match verb {
        "" => Ok(AdminCommand::Open),
        "pin" => Ok(AdminCommand::Pin(required(arg, "admin pin <code>")?.to_string())),
        "list" => Ok(AdminCommand::List),
        "new" => Ok(AdminCommand::New),
        "edit" => parse_index(arg).map(AdminCommand::Edit),
        "title" => Ok(AdminCommand::Title(arg.to_string())),
        "artist" => Ok(AdminCommand::Artist(arg.to_string())),
        "audio" => Ok(AdminCommand::Audio(required(arg, "admin audio <file>")?.into())),
        "cover" => Ok(AdminCommand::Cover(required(arg, "admin cover <file>")?.into())),
        "lyrics" => Ok(AdminCommand::Lyrics(required(arg, "admin lyrics <file>")?.into())),
        "save" => Ok(AdminCommand::Save),
        "delete" => parse_index(arg).map(AdminCommand::Delete),
        "close" => Ok(AdminCommand::Close),
        other => Err(format!("unknown admin command '{other}'")),
    }
}

fn split_verb(line: &str) -> (&str, &str) {
    let line = line.trim();
    line.split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, rest)| (verb, rest.trim()))
}

/// Parse one input line. `Ok(None)` for a blank line.
///
/// # Errors
///
/// Returns a message for the user when the line is not a known command.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let (verb, rest) = split_verb(line);
    let command = match verb.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "home" => Command::Go(Route::Home),
        "search" => Command::Search(rest.to_string()),
        "library" | "lib" => Command::Library(match rest {
            "" | "favorites" | "fav" => LibrarySection::Favorites,
            "playlists" => LibrarySection::Playlists,
            "history" => LibrarySection::History,
            other => return Err(format!("unknown library section '{other}'")),
        }),
        "profile" => Command::Go(Route::Profile),
        "go" => Command::Go(
            Route::from_path(rest).ok_or_else(|| format!("page not found: {rest}"))?,
        ),
        "play" => Command::Play(parse_index(rest)?),
        "queue" => Command::Enqueue(parse_index(rest)?),
        "fav" => Command::Favorite(parse_index(rest)?),
        "toggle" | "p" => Command::Toggle,
        "next" | "n" => Command::Next,
        "prev" | "previous" => Command::Previous,
        "seek" => Command::Seek(
            parse_position(rest).ok_or_else(|| format!("expected m:ss or seconds, got '{rest}'"))?,
        ),
        "vol" | "volume" => {
            let percent: u8 = rest
                .parse()
                .ok()
                .filter(|p| *p <= 100)
                .ok_or_else(|| format!("expected a volume from 0 to 100, got '{rest}'"))?;
            Command::Volume(f32::from(percent) / 100.0)
        }
        "shuffle" => Command::Shuffle,
        "repeat" => Command::Repeat,
        "full" => Command::Fullscreen(true),
        "mini" => Command::Fullscreen(false),
        "lyrics" => Command::Lyrics,
        "now" => Command::Now,
        "lang" => Command::Language(rest.parse()?),
        "login" => {
            let (email, password) = credentials(rest)?;
            Command::Login { email, password }
        }
        "signup" => {
            let (email, password) = credentials(rest)?;
            Command::Signup { email, password }
        }
        "logout" => Command::Logout,
        "rename" => Command::Rename(required(rest, "rename <name>")?.to_string()),
        "admin" => Command::Admin(parse_admin(rest)?),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn test_transport_commands() {
        assert_eq!(parse("play 2"), Command::Play(2));
        assert_eq!(parse("  NEXT "), Command::Next);
        assert_eq!(parse("seek 1:30"), Command::Seek(Duration::from_secs(90)));
        assert_eq!(parse("seek 42"), Command::Seek(Duration::from_secs(42)));
        assert_eq!(parse("vol 50"), Command::Volume(0.5));
        assert_eq!(parse("full"), Command::Fullscreen(true));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse_command("play 0").is_err());
        assert!(parse_command("play x").is_err());
        assert!(parse_command("vol 101").is_err());
        assert!(parse_command("seek 1:75").is_err());
        assert!(parse_command("login ada@example.com").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn test_navigation() {
        assert_eq!(parse("home"), Command::Go(Route::Home));
        assert_eq!(parse("go /profile"), Command::Go(Route::Profile));
        assert!(parse_command("go /missing").is_err());
        assert_eq!(parse("library history"), Command::Library(LibrarySection::History));
        assert_eq!(parse("library"), Command::Library(LibrarySection::Favorites));
        assert_eq!(parse("search "), Command::Search(String::new()));
        assert_eq!(parse("search notte di luna"), Command::Search("notte di luna".into()));
    }

    #[test]
    fn test_account_commands() {
        assert_eq!(
            parse("login ada@example.com secret"),
            Command::Login {
                email: "ada@example.com".into(),
                password: "secret".into()
            }
        );
        assert_eq!(parse("lang fr"), Command::Language(Language::Fr));
        assert!(parse_command("lang de").is_err());
    }

    #[test]
    fn test_admin_commands() {
        assert_eq!(parse("admin"), Command::Admin(AdminCommand::Open));
        assert_eq!(parse("admin pin 1234"), Command::Admin(AdminCommand::Pin("1234".into())));
        assert_eq!(
            parse("admin title Notte di luna"),
            Command::Admin(AdminCommand::Title("Notte di luna".into()))
        );
        assert_eq!(
            parse("admin audio ./songs/notte.mp3"),
            Command::Admin(AdminCommand::Audio(PathBuf::from("./songs/notte.mp3")))
        );
        assert_eq!(parse("admin delete 3"), Command::Admin(AdminCommand::Delete(3)));
        assert!(parse_command("admin pin").is_err());
        assert!(parse_command("admin launch").is_err());
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("0:05"), Some(Duration::from_secs(5)));
        assert_eq!(parse_position("10:00"), Some(Duration::from_secs(600)));
        assert_eq!(parse_position("-3"), None);
        assert_eq!(parse_position("a:b"), None);
    }
}
