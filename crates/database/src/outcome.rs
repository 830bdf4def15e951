//! Results that can succeed with reservations.
//!
//! Opening, bootstrapping and tearing down packages can partially fail
//! without invalidating what was produced: a schema statement that didn't
//! apply, a staging directory that couldn't be removed. Those are reported as
//! [`Issue`]s next to the data instead of replacing it with an error.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The data is usable, but something it depends on is missing or broken.
    Critical,
    /// Nothing wrong with the data; housekeeping failed.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}
impl Issue {
    pub fn critical(message: impl Into<String>) -> Self {
        Self { severity: Severity::Critical, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: message.into() }
    }
}

#[derive(Debug)]
pub enum Outcome<T, E = Error> {
    Success(T),
    Partial(T, Vec<Issue>),
    Failure(E),
}
impl<T, E> Outcome<T, E> {
    /// `Success` when there are no issues, `Partial` otherwise.
    pub fn with_issues(data: T, issues: Vec<Issue>) -> Self {
        match issues.is_empty() {
            true => Self::Success(data),
            false => Self::Partial(data, issues),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) | Self::Partial(data, _) => Some(data),
            Self::Failure(_) => None,
        }
    }

    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::Partial(_, issues) => issues,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Failure(err) => Some(err),
            _ => None,
        }
    }

    /// Append more issues, downgrading `Success` to `Partial` if needed.
    pub fn and_issues(self, more: Vec<Issue>) -> Self {
        match self {
            Self::Success(data) => Self::with_issues(data, more),
            Self::Partial(data, mut issues) => {
                issues.extend(more);
                Self::Partial(data, issues)
            },
            failure => failure,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U, E> {
        match self {
            Self::Success(data) => Outcome::Success(f(data)),
            Self::Partial(data, issues) => Outcome::Partial(f(data), issues),
            Self::Failure(err) => Outcome::Failure(err),
        }
    }

    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Outcome<T, F> {
        match self {
            Self::Success(data) => Outcome::Success(data),
            Self::Partial(data, issues) => Outcome::Partial(data, issues),
            Self::Failure(err) => Outcome::Failure(f(err)),
        }
    }

    /// Split into the data (if any) and its issues.
    pub fn into_parts(self) -> (Result<T, E>, Vec<Issue>) {
        match self {
            Self::Success(data) => (Ok(data), Vec::new()),
            Self::Partial(data, issues) => (Ok(data), issues),
            Self::Failure(err) => (Err(err), Vec::new()),
        }
    }

    /// Discard the issues, logging them.
    pub fn into_result(self) -> Result<T, E> {
        let (result, issues) = self.into_parts();
        for issue in issues {
            tracing::warn!(severity = ?issue.severity, "{}", issue.message);
        }
        result
    }
}
impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(err) => Self::Failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_issues() {
        let outcome: Outcome<u8, ()> = Outcome::with_issues(1, Vec::new());
        assert!(outcome.is_success());
        let outcome: Outcome<u8, ()> = Outcome::with_issues(1, vec![Issue::critical("broken")]);
        assert_eq!(outcome.data(), Some(&1));
        assert_eq!(outcome.issues()[0].severity, Severity::Critical);
    }

    #[test]
    fn test_and_issues_keeps_data() {
        let outcome: Outcome<&str, ()> = Outcome::Success("result").and_issues(vec![Issue::warning("cleanup")]);
        match outcome {
            Outcome::Partial(data, issues) => {
                assert_eq!(data, "result");
                assert_eq!(issues, vec![Issue::warning("cleanup")]);
            },
            _ => panic!("expected a partial outcome"),
        }
    }

    #[test]
    fn test_failure_has_no_data() {
        let outcome: Outcome<u8, &str> = Outcome::Failure("nope");
        assert!(outcome.is_failure());
        assert_eq!(outcome.data(), None);
        assert_eq!(outcome.into_result(), Err("nope"));
    }
}
