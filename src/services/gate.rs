//! Decides, per page load, whether a page is shown or the visitor is sent
//! elsewhere based on whether a session exists.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Login,
    Dashboard,
    Registration,
    Features,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Reveal,
    Redirect(Page),
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Login, Page::Dashboard, Page::Registration, Page::Features];

    pub fn from_path(path: &str) -> Option<Page> {
        match path.trim_end_matches(".html") {
            "" | "/" | "/login" | "/index" => Some(Page::Login),
            "/dashboard" => Some(Page::Dashboard),
            "/register" => Some(Page::Registration),
            "/features" => Some(Page::Features),
            _ => None,
        }
    }

    /// Canonical URL of the page.
    pub fn path(self) -> &'static str {
        match self {
            Page::Login => "/login",
            Page::Dashboard => "/dashboard",
            Page::Registration => "/register",
            Page::Features => "/features",
        }
    }

    /// File served from the static directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Page::Login => "login.html",
            Page::Dashboard => "dashboard.html",
            Page::Registration => "register.html",
            Page::Features => "features.html",
        }
    }
}

pub fn decide(session_present: bool, page: Page) -> GateDecision {
    match (session_present, page) {
        (true, Page::Login) => GateDecision::Redirect(Page::Dashboard),
        (true, _) => GateDecision::Reveal,
        (false, Page::Login) => GateDecision::Reveal,
        (false, _) => GateDecision::Redirect(Page::Login),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_four_rules() {
        assert_eq!(decide(true, Page::Login), GateDecision::Redirect(Page::Dashboard));
        assert_eq!(decide(true, Page::Features), GateDecision::Reveal);
        assert_eq!(decide(false, Page::Registration), GateDecision::Redirect(Page::Login));
        assert_eq!(decide(false, Page::Login), GateDecision::Reveal);
    }

    #[test]
    fn one_redirect_always_lands_on_a_revealed_page() {
        for session in [true, false] {
            for page in Page::ALL {
                if let GateDecision::Redirect(target) = decide(session, page) {
                    assert_eq!(decide(session, target), GateDecision::Reveal, "{page:?}");
                }
            }
        }
    }

    #[test]
    fn paths_round_trip() {
        for page in Page::ALL {
            assert_eq!(Page::from_path(page.path()), Some(page));
        }
        assert_eq!(Page::from_path("/"), Some(Page::Login));
        assert_eq!(Page::from_path("/login.html"), Some(Page::Login));
        assert_eq!(Page::from_path("/admin"), None);
    }
}
