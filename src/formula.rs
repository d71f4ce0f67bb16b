//! Model-formula parsing.
//!
//! Formulas use the conventional `response ~ term + term` surface. A leading
//! `0 +` or `-1 +` on the right-hand side drops the intercept; a trailing
//! `(1|group)` term declares a random intercept keyed by `group`.

use crate::RegsimError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub response: String,
    pub intercept: bool,
    pub terms: Vec<String>,
    pub random_intercept: Option<String>,
}

impl Formula {
    pub fn parse(raw: &str) -> Result<Self, RegsimError> {
        let mut sides = raw.splitn(2, '~');
        let lhs = sides.next().unwrap_or("").trim();
        let rhs = sides
            .next()
            .ok_or_else(|| {
                RegsimError::InvalidConfig(format!("formula '{raw}' is missing '~'"))
            })?
            .trim();

        if lhs.is_empty() {
            return Err(RegsimError::InvalidConfig(format!(
                "formula '{raw}' has an empty response"
            )));
        }
        if !is_identifier(lhs) {
            return Err(RegsimError::InvalidConfig(format!(
                "formula response '{lhs}' is not a plain variable name"
            )));
        }

        let mut intercept = true;
        let mut terms = Vec::new();
        let mut random_intercept = None;

        for part in rhs.split('+') {
            let part = part.trim();
            if part.is_empty() {
                return Err(RegsimError::InvalidConfig(format!(
                    "formula '{raw}' contains an empty term"
                )));
            }
            if part == "0" || part == "-1" {
                intercept = false;
                continue;
            }
            if part == "1" {
                intercept = true;
                continue;
            }
            if part.starts_with('(') && part.ends_with(')') {
                let inner = &part[1..part.len() - 1];
                let mut halves = inner.splitn(2, '|');
                let lhs = halves.next().unwrap_or("").trim();
                let group = halves
                    .next()
                    .ok_or_else(|| {
                        RegsimError::InvalidConfig(format!(
                            "random-effect term '{part}' must have the form (1|group)"
                        ))
                    })?
                    .trim();
                if lhs != "1" || !is_identifier(group) {
                    return Err(RegsimError::InvalidConfig(format!(
                        "random-effect term '{part}' must have the form (1|group)"
                    )));
                }
                if random_intercept.replace(group.to_string()).is_some() {
                    return Err(RegsimError::InvalidConfig(format!(
                        "formula '{raw}' declares more than one random intercept"
                    )));
                }
                continue;
            }
            if !is_identifier(part) {
                return Err(RegsimError::InvalidConfig(format!(
                    "formula term '{part}' is not a plain variable name"
                )));
            }
            if terms.iter().any(|t| t == part) {
                return Err(RegsimError::InvalidConfig(format!(
                    "formula term '{part}' appears more than once"
                )));
            }
            terms.push(part.to_string());
        }

        if terms.is_empty() && !intercept {
            return Err(RegsimError::InvalidConfig(format!(
                "formula '{raw}' has no fixed-effect terms"
            )));
        }

        Ok(Self {
            response: lhs.to_string(),
            intercept,
            terms,
            random_intercept,
        })
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::Formula;

    #[test]
    fn parses_plain_formula() {
        let f = Formula::parse("y ~ x1 + x2").unwrap();
        assert_eq!(f.response, "y");
        assert!(f.intercept);
        assert_eq!(f.terms, vec!["x1", "x2"]);
        assert!(f.random_intercept.is_none());
    }

    #[test]
    fn zero_drops_intercept() {
        let f = Formula::parse("y ~ 0 + x").unwrap();
        assert!(!f.intercept);
        assert_eq!(f.terms, vec!["x"]);

        let g = Formula::parse("y ~ -1 + x").unwrap();
        assert!(!g.intercept);
    }

    #[test]
    fn parses_random_intercept() {
        let f = Formula::parse("y ~ x + (1|clinic)").unwrap();
        assert_eq!(f.random_intercept.as_deref(), Some("clinic"));
        assert_eq!(f.terms, vec!["x"]);
    }

    #[test]
    fn rejects_malformed_formulas() {
        assert!(Formula::parse("y x").is_err());
        assert!(Formula::parse("~ x").is_err());
        assert!(Formula::parse("y ~ x + x").is_err());
        assert!(Formula::parse("y ~ (x|g)").is_err());
        assert!(Formula::parse("y ~ 0").is_err());
    }

    #[test]
    fn rejects_duplicate_random_intercepts() {
        assert!(Formula::parse("y ~ x + (1|a) + (1|b)").is_err());
    }
}
