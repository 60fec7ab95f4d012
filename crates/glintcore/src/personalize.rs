use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Neutral,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Gender> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            "neutral" | "n" => Some(Gender::Neutral),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Neutral => "neutral",
        }
    }

    // she/he looks tired
    fn subjective(self) -> &'static str {
        match self {
            Gender::Male => "he",
            Gender::Female => "she",
            Gender::Neutral => "it",
        }
    }

    // look at her/him
    fn objective(self) -> &'static str {
        match self {
            Gender::Male => "him",
            Gender::Female => "her",
            Gender::Neutral => "it",
        }
    }

    // that thing is hers/his
    fn possessive(self) -> &'static str {
        match self {
            Gender::Male => "his",
            Gender::Female => "hers",
            Gender::Neutral => "its",
        }
    }

    // lost her/his thingy
    fn possessive_adj(self) -> &'static str {
        match self {
            Gender::Male => "his",
            Gender::Female => "her",
            Gender::Neutral => "its",
        }
    }

    fn reflexive(self) -> &'static str {
        match self {
            Gender::Male => "himself",
            Gender::Female => "herself",
            Gender::Neutral => "itself",
        }
    }
}

/// A `(display name, gender)` pair, all `personalize` needs to know about
/// whoever is acting or being acted upon.
pub type Persona<'a> = (&'a str, Gender);

/// Replace pronoun/name keywords in a broadcast template.
///
/// Actor keywords: `#actor`, `#a_she/he`, `#a_her/him`, `#a_hers/his`,
/// `#a_her/his`, `#a_self`. Target keywords are the `#t_*` equivalents plus
/// `#target`, substituted only when a target is present.
pub fn personalize(message: &str, actor: Persona<'_>, target: Option<Persona<'_>>) -> String {
    let (name, gender) = actor;
    let mut out = message
        .replace("#actor", name)
        .replace("#a_she/he", gender.subjective())
        .replace("#a_her/him", gender.objective())
        .replace("#a_hers/his", gender.possessive())
        .replace("#a_her/his", gender.possessive_adj())
        .replace("#a_self", gender.reflexive());

    if let Some((tname, tgender)) = target {
        out = out
            .replace("#target", tname)
            .replace("#t_she/he", tgender.subjective())
            .replace("#t_her/him", tgender.objective())
            .replace("#t_hers/his", tgender.possessive())
            .replace("#t_her/his", tgender.possessive_adj())
            .replace("#t_self", tgender.reflexive());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_keywords_are_replaced() {
        let msg = personalize(
            "#actor dusts #a_her/his hands and admires #a_self.",
            ("Alice", Gender::Female),
            None,
        );
        assert_eq!(msg, "Alice dusts her hands and admires herself.");
    }

    #[test]
    fn target_keywords_need_a_target() {
        let tpl = "#actor waves at #target; #t_she/he waves back.";
        let with = personalize(tpl, ("Bob", Gender::Male), Some(("Eve", Gender::Female)));
        assert_eq!(with, "Bob waves at Eve; she waves back.");

        let without = personalize(tpl, ("Bob", Gender::Male), None);
        assert!(without.contains("#target"));
    }

    #[test]
    fn possessive_variants_differ_for_female() {
        let msg = personalize(
            "#a_hers/his vs #a_her/his",
            ("Alice", Gender::Female),
            None,
        );
        assert_eq!(msg, "hers vs her");
    }

    #[test]
    fn gender_parse_accepts_short_forms() {
        assert_eq!(Gender::parse("Male"), Some(Gender::Male));
        assert_eq!(Gender::parse("f"), Some(Gender::Female));
        assert_eq!(Gender::parse("robot"), None);
    }
}
