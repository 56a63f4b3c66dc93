//! Route glob patterns.
//!
//! `*` matches exactly one path segment and `**` matches zero or more.
//! Matching is anchored at both ends: `/admin/**` matches `/admin` and
//! `/admin/users/5` but never `/adminx/5`.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl RoutePattern {
    pub fn new(pattern: &str) -> Self {
        let segments = split(pattern)
            .map(|s| match s {
                "*" => Segment::One,
                "**" => Segment::Any,
                lit => Segment::Literal(lit.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, route: &str) -> bool {
        let route: Vec<&str> = split(route).collect();
        match_segments(&self.segments, &route)
    }
}

fn match_segments(pattern: &[Segment], route: &[&str]) -> bool {
    match pattern.split_first() {
        None => route.is_empty(),
        Some((Segment::Any, rest)) => (0..=route.len()).any(|skip| match_segments(rest, &route[skip..])),
        Some((Segment::One, rest)) => !route.is_empty() && match_segments(rest, &route[1..]),
        Some((Segment::Literal(lit), rest)) => {
            route.first().is_some_and(|s| *s == lit.as_str()) && match_segments(rest, &route[1..])
        }
    }
}

/// Whether `route` matches any of `patterns`.
pub fn matches_any<'a>(patterns: impl IntoIterator<Item = &'a String>, route: &str) -> bool {
    patterns
        .into_iter()
        .any(|p| RoutePattern::new(p).matches(route))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_star_matches_any_depth() {
        let p = RoutePattern::new("/admin/**");
        assert!(p.matches("/admin/users/5"));
        assert!(p.matches("/admin"));
        assert!(!p.matches("/adminx/5"));
        assert!(!p.matches("/public/admin/5"));
    }

    #[test]
    fn single_star_matches_one_segment() {
        let p = RoutePattern::new("/settings/*");
        assert!(p.matches("/settings/profile"));
        assert!(!p.matches("/settings/profile/edit"));
        assert!(!p.matches("/settings"));
    }

    #[test]
    fn literal_is_anchored() {
        let p = RoutePattern::new("/identity");
        assert!(p.matches("/identity"));
        assert!(p.matches("/identity/"));
        assert!(!p.matches("/identity/keys"));
    }

    #[test]
    fn double_star_in_the_middle() {
        let p = RoutePattern::new("/content/**/edit");
        assert!(p.matches("/content/edit"));
        assert!(p.matches("/content/a/b/edit"));
        assert!(!p.matches("/content/a/b/view"));
    }
}
