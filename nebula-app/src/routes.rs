use nebula_core::Translations;
use std::fmt;

/// Screens of the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Home,
    Search,
    Library,
    Profile,
    Auth,
}

/// Bottom navigation, in display order
pub const NAV_ITEMS: [Route; 4] = [Route::Home, Route::Search, Route::Library, Route::Profile];

impl Route {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Search => "/search",
            Self::Library => "/library",
            Self::Profile => "/profile",
            Self::Auth => "/auth",
        }
    }

    /// Resolve a path. Unknown paths are `None` (the not-found screen).
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim();
        let normalized = if trimmed.len() > 1 {
            trimmed.trim_end_matches('/')
        } else {
            trimmed
        };
        match normalized {
            "/" | "" => Some(Self::Home),
            "/search" => Some(Self::Search),
            "/library" => Some(Self::Library),
            "/profile" => Some(Self::Profile),
            "/auth" => Some(Self::Auth),
            _ => None,
        }
    }

    /// Screens that need a signed-in user
    #[must_use]
    pub const fn requires_session(self) -> bool {
        matches!(self, Self::Library)
    }

    #[must_use]
    pub const fn label(self, t: &Translations) -> &'static str {
        match self {
            Self::Home => t.home,
            Self::Search => t.search,
            Self::Library => t.library,
            Self::Profile => t.profile,
            Self::Auth => "Login",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// One-line bottom navigation bar with the active screen bracketed
#[must_use]
pub fn render_nav(active: Route, t: &Translations) -> String {
    NAV_ITEMS
        .iter()
        .map(|route| {
            if *route == active {
                format!("[{}]", route.label(t))
            } else {
                format!(" {} ", route.label(t))
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}
