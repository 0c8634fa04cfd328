//! Content-type parsing and wildcard-aware subset comparison.
//!
//! Parsing never fails: malformed input produces a [`MediaType`] whose
//! components are whatever text was present, so a garbage request header
//! simply fails to be a subset of anything declared.

use std::fmt;

/// A parsed media type such as `application/vnd.foo+json; charset=utf-8`.
///
/// Type, subtype and suffix comparisons are ASCII case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    media_type: String,
    subtype: String,
    suffix: Option<String>,
    charset: Option<String>,
    parameters: Vec<(String, String)>,
}

impl MediaType {
    /// Parse a content-type string.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut pieces = value.split(';');
        let range = pieces.next().unwrap_or_default().trim();

        let (media_type, subtype) = match range.split_once('/') {
            Some((t, s)) => (t.trim(), s.trim()),
            None => (range, ""),
        };

        let suffix = subtype
            .rsplit_once('+')
            .map(|(_, suffix)| suffix.to_string());

        let mut charset = None;
        let mut parameters = Vec::new();
        for raw in pieces {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (name, value) = match raw.split_once('=') {
                Some((n, v)) => (n.trim(), v.trim().trim_matches('"')),
                None => (raw, ""),
            };
            if name.eq_ignore_ascii_case("charset") && charset.is_none() {
                charset = Some(value.to_string());
            }
            parameters.push((name.to_string(), value.to_string()));
        }

        Self {
            media_type: media_type.to_string(),
            subtype: subtype.to_string(),
            suffix,
            charset,
            parameters,
        }
    }

    /// Top-level type, e.g. `application`.
    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Full subtype including any suffix, e.g. `vnd.foo+json`.
    #[must_use]
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Structured syntax suffix, e.g. `json` for `vnd.foo+json`.
    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Subtype with the `+suffix` removed.
    #[must_use]
    pub fn subtype_without_suffix(&self) -> &str {
        match self.subtype.rsplit_once('+') {
            Some((head, _)) => head,
            None => &self.subtype,
        }
    }

    /// The `charset` parameter, if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// All parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// `*/*` style: the type itself is a wildcard.
    #[must_use]
    pub fn matches_all_types(&self) -> bool {
        self.media_type == "*"
    }

    /// `text/*` style: a concrete type with a wildcard subtype.
    #[must_use]
    pub fn matches_all_subtypes(&self) -> bool {
        !self.matches_all_types() && self.subtype == "*"
    }

    /// `application/*+json` style: wildcard before a structured suffix.
    #[must_use]
    pub fn matches_all_subtypes_without_suffix(&self) -> bool {
        self.suffix.is_some() && self.subtype_without_suffix() == "*"
    }

    /// Whether every concrete message of `self` also satisfies `set`.
    ///
    /// Type is compared first, then subtype, then suffix. Parameters other
    /// than the ones `set` pins explicitly are ignored, and `charset`, `q`
    /// and `*` never participate.
    #[must_use]
    pub fn is_subset_of(&self, set: &MediaType) -> bool {
        self.matches_type(set) && self.matches_subtype(set) && self.contains_parameters_of(set)
    }

    /// Specificity bucket used to order content-type edges: 1 exact,
    /// 2 wildcard before suffix, 3 wildcard subtype, 4 wildcard type.
    #[must_use]
    pub fn specificity(&self) -> u8 {
        if self.matches_all_types() {
            4
        } else if self.matches_all_subtypes() {
            3
        } else if self.matches_all_subtypes_without_suffix() {
            2
        } else {
            1
        }
    }

    fn matches_type(&self, set: &MediaType) -> bool {
        set.matches_all_types() || set.media_type.eq_ignore_ascii_case(&self.media_type)
    }

    fn matches_subtype(&self, set: &MediaType) -> bool {
        if set.subtype == "*" {
            return true;
        }
        match (&set.suffix, &self.suffix) {
            (Some(set_suffix), Some(own_suffix)) => {
                let head_matches = set.subtype_without_suffix() == "*"
                    || set
                        .subtype_without_suffix()
                        .eq_ignore_ascii_case(self.subtype_without_suffix());
                head_matches && set_suffix.eq_ignore_ascii_case(own_suffix)
            }
            // A suffixed pattern never accepts an unsuffixed type.
            (Some(_), None) => false,
            (None, _) => set.subtype.eq_ignore_ascii_case(&self.subtype),
        }
    }

    fn contains_parameters_of(&self, set: &MediaType) -> bool {
        for (name, value) in &set.parameters {
            if name.eq_ignore_ascii_case("q") {
                break;
            }
            if name == "*" || name.eq_ignore_ascii_case("charset") {
                continue;
            }
            let found = self
                .parameters
                .iter()
                .any(|(n, v)| n.eq_ignore_ascii_case(name) && v.eq_ignore_ascii_case(value));
            if !found {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.media_type, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, "; {name}={value}")?;
        }
        Ok(())
    }
}

impl From<&str> for MediaType {
    fn from(value: &str) -> Self {
        MediaType::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffix_and_charset() {
        let mt = MediaType::parse("application/vnd.foo+json; charset=\"utf-8\"");
        assert_eq!(mt.media_type(), "application");
        assert_eq!(mt.subtype(), "vnd.foo+json");
        assert_eq!(mt.subtype_without_suffix(), "vnd.foo");
        assert_eq!(mt.suffix(), Some("json"));
        assert_eq!(mt.charset(), Some("utf-8"));
    }

    #[test]
    fn malformed_input_is_accepted_literally() {
        let mt = MediaType::parse("garbage");
        assert_eq!(mt.media_type(), "garbage");
        assert_eq!(mt.subtype(), "");
        assert!(!mt.is_subset_of(&MediaType::parse("application/json")));
        assert!(mt.is_subset_of(&MediaType::parse("*/*")));

        let empty = MediaType::parse("");
        assert_eq!(empty.media_type(), "");
        assert!(empty.suffix().is_none());
    }

    #[test]
    fn wildcard_flags() {
        assert!(MediaType::parse("*/*").matches_all_types());
        assert!(!MediaType::parse("*/*").matches_all_subtypes());
        assert!(MediaType::parse("text/*").matches_all_subtypes());
        assert!(MediaType::parse("application/*+json").matches_all_subtypes_without_suffix());
        assert!(!MediaType::parse("application/json").matches_all_subtypes_without_suffix());
    }

    #[test]
    fn subset_is_not_symmetric() {
        let json = MediaType::parse("application/json");
        let any_app = MediaType::parse("application/*");
        assert!(json.is_subset_of(&any_app));
        assert!(!any_app.is_subset_of(&json));
    }

    #[test]
    fn subset_is_case_insensitive_and_ignores_charset() {
        let request = MediaType::parse("Application/JSON; charset=utf-8");
        assert!(request.is_subset_of(&MediaType::parse("application/json")));
        assert!(request.is_subset_of(&MediaType::parse("application/json; charset=latin1")));
    }

    #[test]
    fn suffix_wildcards() {
        let vendor = MediaType::parse("application/vnd.foo+json");
        assert!(vendor.is_subset_of(&MediaType::parse("application/*+json")));
        assert!(vendor.is_subset_of(&MediaType::parse("application/vnd.foo+json")));
        assert!(!vendor.is_subset_of(&MediaType::parse("application/json")));
        assert!(!vendor.is_subset_of(&MediaType::parse("application/*+xml")));
        assert!(!MediaType::parse("application/json").is_subset_of(&MediaType::parse("application/*+json")));
    }

    #[test]
    fn pinned_parameters_must_be_present() {
        let set = MediaType::parse("text/plain; format=flowed");
        assert!(MediaType::parse("text/plain; format=flowed; charset=utf-8").is_subset_of(&set));
        assert!(!MediaType::parse("text/plain").is_subset_of(&set));
        assert!(MediaType::parse("text/plain").is_subset_of(&MediaType::parse("text/plain; q=0.5; format=x")));
    }

    #[test]
    fn specificity_ordering() {
        assert_eq!(MediaType::parse("*/*").specificity(), 4);
        assert_eq!(MediaType::parse("text/*").specificity(), 3);
        assert_eq!(MediaType::parse("application/*+json").specificity(), 2);
        assert_eq!(MediaType::parse("application/json").specificity(), 1);
    }
}
