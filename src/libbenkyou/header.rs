use crate::libbenkyou::auth::AuthContext;

pub const BRAND: &str = "Khan Education";

/// In-page anchors, in display order.
pub const SECTIONS: [(&str, &str); 4] = [
    ("features", "Features"),
    ("how-it-works", "How It Works"),
    ("testimonials", "Testimonials"),
    ("pricing", "Pricing"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavItem {
    Section { id: &'static str, label: &'static str },
    Logout,
    Dashboard,
    GetStarted,
}

impl NavItem {
    pub fn label(self) -> &'static str {
        match self {
            NavItem::Section { label, .. } => label,
            NavItem::Logout => "Logout",
            NavItem::Dashboard => "Go to Dashboard",
            NavItem::GetStarted => "Get Started",
        }
    }

    /// Route or `#anchor`. Logout is an action, not a link.
    pub fn target(self) -> Option<String> {
        match self {
            NavItem::Section { id, .. } => Some(format!("#{id}")),
            NavItem::Logout => None,
            NavItem::Dashboard => Some(String::from("/dashboard")),
            NavItem::GetStarted => Some(String::from("/login")),
        }
    }
}

pub fn section_items() -> Vec<NavItem> {
    SECTIONS
        .iter()
        .map(|&(id, label)| NavItem::Section { id, label })
        .collect()
}

/// Nothing while auth is still resolving, so the buttons don't flicker.
pub fn auth_items(auth: &AuthContext) -> Vec<NavItem> {
    if auth.is_loading() {
        Vec::new()
    } else if auth.is_authenticated() {
        vec![NavItem::Logout, NavItem::Dashboard]
    } else {
        vec![NavItem::GetStarted]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    menu_open: bool,
}

impl Header {
    pub fn toggle_menu(&mut self) {
        self.menu_open = !self.menu_open;
    }

    pub fn is_menu_open(&self) -> bool {
        self.menu_open
    }

    /// Desktop bar: sections, then auth items.
    pub fn items(&self, auth: &AuthContext) -> Vec<NavItem> {
        let mut items = section_items();
        items.extend(auth_items(auth));
        items
    }

    /// Same items as the bar, only while the mobile menu is open.
    pub fn menu_items(&self, auth: &AuthContext) -> Vec<NavItem> {
        if self.menu_open {
            self.items(auth)
        } else {
            Vec::new()
        }
    }

    /// Picking an item closes the mobile menu. Logout ends the session.
    pub fn select(&mut self, item: NavItem, auth: &mut AuthContext) -> Option<String> {
        self.menu_open = false;
        if item == NavItem::Logout {
            auth.clear();
        }
        item.target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libbenkyou::auth::tests::session_for;
    use crate::libbenkyou::users::Role;
    use pretty_assertions::assert_eq;

    #[test]
    fn auth_items_follow_session_state() {
        let mut auth = AuthContext::anonymous();
        assert_eq!(auth_items(&auth), vec![NavItem::GetStarted]);

        auth.set_loading(true);
        assert!(auth_items(&auth).is_empty());

        auth.set_auth(session_for(Role::Student, None));
        assert_eq!(auth_items(&auth), vec![NavItem::Logout, NavItem::Dashboard]);
    }

    #[test]
    fn menu_toggles_and_closes_on_select() {
        let auth = AuthContext::anonymous();
        let mut header = Header::default();
        assert!(header.menu_items(&auth).is_empty());

        header.toggle_menu();
        let items = header.menu_items(&auth);
        assert_eq!(items.len(), SECTIONS.len() + 1);
        assert_eq!(items.last().map(|i| i.label()), Some("Get Started"));

        let mut auth = auth;
        assert_eq!(
            header.select(items[1], &mut auth),
            Some(String::from("#how-it-works"))
        );
        assert!(!header.is_menu_open());
    }

    #[test]
    fn logout_clears_the_session() {
        let mut auth = AuthContext::signed_in(session_for(Role::Admin, None));
        let mut header = Header::default();
        assert_eq!(header.select(NavItem::Logout, &mut auth), None);
        assert!(!auth.is_authenticated());
        assert_eq!(header.items(&auth).last(), Some(&NavItem::GetStarted));
    }
}
