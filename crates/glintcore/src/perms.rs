use bitflags::bitflags;

bitflags! {
    /// Actor permission bits. Commands declare a required mask; GOD
    /// bypasses every check.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const PLAYER  = 1;
        const BUILDER = 2;
        const DM      = 4;
        const ADMIN   = 8;
        const GOD     = 16;
    }
}

impl Permissions {
    pub fn parse(name: &str) -> Option<Permissions> {
        match name.trim().to_ascii_lowercase().as_str() {
            "player" => Some(Permissions::PLAYER),
            "builder" => Some(Permissions::BUILDER),
            "dm" => Some(Permissions::DM),
            "admin" => Some(Permissions::ADMIN),
            "god" => Some(Permissions::GOD),
            _ => None,
        }
    }

    /// Comma-separated group names, for `list`-style displays.
    pub fn names(self) -> String {
        let mut v = Vec::new();
        for (bit, name) in [
            (Permissions::PLAYER, "player"),
            (Permissions::BUILDER, "builder"),
            (Permissions::DM, "dm"),
            (Permissions::ADMIN, "admin"),
            (Permissions::GOD, "god"),
        ] {
            if self.contains(bit) {
                v.push(name);
            }
        }
        v.join(", ")
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::PLAYER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Permissions::parse("GOD"), Some(Permissions::GOD));
        assert_eq!(Permissions::parse(" dm "), Some(Permissions::DM));
        assert_eq!(Permissions::parse("wizard"), None);
    }

    #[test]
    fn names_round_trip() {
        let p = Permissions::PLAYER | Permissions::ADMIN;
        assert_eq!(p.names(), "player, admin");
    }
}
