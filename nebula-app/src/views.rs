//! Text renderings of the player chrome and catalog lists.

use nebula_core::lyrics::visible_lines;
use nebula_core::{
    format_bytes, format_clock, format_song_duration, LibraryStats, PlaybackState, RepeatMode,
    Song, Translations,
};
use std::fmt::Write;

const BAR_WIDTH: usize = 30;
const LYRICS_BEFORE: usize = 2;
const LYRICS_AFTER: usize = 3;

/// `width`-wide bar filled in proportion to `fraction`
#[must_use]
pub fn progress_bar(fraction: f32, width: usize) -> String {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let filled = ((fraction * width as f32).round() as usize).min(width);

    let mut bar = "█".repeat(filled);
    bar.push_str(&"─".repeat(width - filled));
    bar
}

fn song_label(song: &Song) -> String {
    format!("{} - {}", song.title, song.artist)
}

/// The bar shown above the navigation while something is loaded
#[must_use]
pub fn mini_player(state: &PlaybackState) -> Option<String> {
    let song = state.current_song.as_ref()?;
    let icon = if state.is_playing { "⏸" } else { "▶" };

    Some(format!(
        "{icon} {}  {}  {}",
        song_label(song),
        progress_bar(state.progress(), BAR_WIDTH / 2),
        format_clock(state.current_time)
    ))
}

fn repeat_label(mode: RepeatMode) -> &'static str {
    match mode {
        RepeatMode::Off => "repeat off",
        RepeatMode::All => "repeat all",
        RepeatMode::One => "repeat one",
    }
}

/// Full player: title, scrubber, modes and, when asked, the lyric window
#[must_use]
pub fn fullscreen_player(state: &PlaybackState, show_lyrics: bool) -> String {
    let Some(song) = state.current_song.as_ref() else {
        return String::new();
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", song.title);
    let _ = writeln!(out, "{}", song.artist);
    let _ = writeln!(
        out,
        "{} {} {}",
        format_clock(state.current_time),
        progress_bar(state.progress(), BAR_WIDTH),
        format_clock(state.duration)
    );

    let volume = (state.volume * 100.0).round();
    let _ = writeln!(
        out,
        "{}  shuffle {}  {}  vol {volume}%  track {}/{}",
        if state.is_playing { "playing" } else { "paused" },
        if state.is_shuffle { "on" } else { "off" },
        repeat_label(state.repeat_mode),
        state.current_index + 1,
        state.queue_len.max(1),
    );

    if show_lyrics && song.has_lyrics() {
        out.push('\n');
        out.push_str(&lyric_window(song, state.current_lyric_index));
    }

    out.trim_end().to_string()
}

/// Lines around the active lyric, the active one marked with `>`
#[must_use]
pub fn lyric_window(song: &Song, current: Option<usize>) -> String {
    let lines = song.lyric_lines();
    let window = visible_lines(lines, current, LYRICS_BEFORE, LYRICS_AFTER);
    let offset = current.map_or(0, |idx| {
        idx.min(lines.len().saturating_sub(1))
            .saturating_sub(LYRICS_BEFORE)
    });

    window
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let marker = if current == Some(offset + i) { ">" } else { " " };
            format!("{marker} {}", line.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered song list; the numbers are what `play <n>` refers to
#[must_use]
pub fn song_list(songs: &[Song], t: &Translations) -> String {
    if songs.is_empty() {
        return t.no_songs.to_string();
    }

    songs
        .iter()
        .enumerate()
        .map(|(i, song)| {
            format!(
                "{:>3}. {}  ({})",
                i + 1,
                song_label(song),
                format_song_duration(song.duration)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub fn home_header(t: &Translations, hour: u32) -> String {
    format!("{}\n{}", t.greeting(hour), t.what_to_listen)
}

#[must_use]
pub fn library_stats(stats: &LibraryStats, t: &Translations) -> String {
    format!(
        "{}: {}   {}: {}",
        t.songs,
        stats.songs_count,
        t.space,
        format_bytes(stats.total_size)
    )
}

/// Total listening time as `1h 05m`, or `12m` under an hour
#[must_use]
pub fn listen_time(total_seconds: u64) -> String {
    let minutes = total_seconds / 60;
    if minutes < 60 {
        format!("{minutes}m")
    } else {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    }
}
