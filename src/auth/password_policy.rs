/*!
 * # Password Policy Module
 *
 * Password checks applied at registration: minimum length, entirely numeric
 * passwords, commonly used passwords and passwords too close to the account's
 * own username or email. All failures are reported, not just the first.
 */

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

/// Shortest value that counts as contained in (or containing) a password
const MIN_CONTAINED_LEN: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordPolicyError {
    #[error("This password is too short. It must contain at least {min_length} characters.")]
    TooShort { min_length: usize },

    #[error("This password is too long. It may contain at most {max_length} characters.")]
    TooLong { max_length: usize },

    #[error("This password is too common.")]
    CommonPassword,

    #[error("This password is entirely numeric.")]
    EntirelyNumeric,

    #[error("The password is too similar to the {attribute}.")]
    TooSimilar { attribute: &'static str },
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub prevent_common_passwords: bool,
    pub prevent_numeric: bool,
    /// Similarity ratio (0.0..=1.0) at or above which a password is rejected
    pub max_similarity: f64,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            prevent_common_passwords: true,
            prevent_numeric: true,
            max_similarity: 0.7,
        }
    }
}

lazy_static! {
    // Common weak passwords, compared case-insensitively
    static ref COMMON_PASSWORDS: HashSet<&'static str> = {
        let common = [
            "password", "123456", "123456789", "qwerty", "abc123", "password123",
            "admin", "letmein", "welcome", "monkey", "1234567890", "iloveyou",
            "princess", "rockyou", "1234567", "12345678", "password1", "123123",
            "football", "baseball", "welcome1", "jordan23", "superman", "michael",
            "pepper", "whatever", "trustno1", "ninja", "harley", "ranger",
            "shadow", "matthew", "hunter", "thomas", "summer", "robert", "buster",
            "jennifer", "jordan", "tigger", "andrew", "michelle", "sunshine",
            "danielle", "jessica", "zaq1zaq1", "qwerty123", "test123", "charlie",
            "qazwsx", "1qaz2wsx", "q1w2e3r4", "asdfghjkl", "zxcvbnm", "asdf1234",
            "qwertyuiop", "passw0rd", "p@ssw0rd", "dragon", "master", "freedom",
            "starwars", "computer", "internet", "shopping", "customer", "changeme",
            "11111111", "00000000", "12341234", "87654321", "abcdefgh", "abcd1234",
            "111111", "222222", "333333", "444444", "555555", "666666", "777777",
            "888888", "999999", "000000", "aaaaaa", "qwerty1", "secret", "google",
        ];
        common.into_iter().collect()
    };

    static ref NON_WORD: Regex = Regex::new(r"\W+").expect("static regex");
}

impl PasswordPolicy {
    pub fn with_min_length(min_length: usize) -> Self {
        Self {
            min_length,
            ..Default::default()
        }
    }

    /// Validate a password against the policy, collecting every failure.
    ///
    /// `attributes` are the account's own values (label, value), e.g.
    /// `("username", "alice")`; blank values are skipped.
    pub fn validate(
        &self,
        password: &str,
        attributes: &[(&'static str, &str)],
    ) -> Result<(), Vec<PasswordPolicyError>> {
        let mut errors = Vec::new();
        let length = password.chars().count();

        if let Some(attribute) = attributes
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .find(|(_, value)| self.is_too_similar(password, value))
            .map(|(attribute, _)| *attribute)
        {
            errors.push(PasswordPolicyError::TooSimilar { attribute });
        }

        if length < self.min_length {
            errors.push(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        if length > self.max_length {
            errors.push(PasswordPolicyError::TooLong {
                max_length: self.max_length,
            });
        }

        if self.prevent_common_passwords
            && COMMON_PASSWORDS.contains(password.trim().to_lowercase().as_str())
        {
            errors.push(PasswordPolicyError::CommonPassword);
        }

        if self.prevent_numeric && !password.is_empty() && password.chars().all(|c| c.is_numeric())
        {
            errors.push(PasswordPolicyError::EntirelyNumeric);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// A password is too similar to a value if either contains the other, or if
    /// the value (or any word in it) matches the password with a ratio at or
    /// above `max_similarity`. Containment only counts when both sides have at
    /// least [`MIN_CONTAINED_LEN`] characters.
    fn is_too_similar(&self, password: &str, value: &str) -> bool {
        let password_lower = password.to_lowercase();
        let value_lower = value.to_lowercase();

        let long_enough = |s: &str| s.chars().count() >= MIN_CONTAINED_LEN;
        if long_enough(&password_lower)
            && long_enough(&value_lower)
            && (password_lower.contains(&value_lower) || value_lower.contains(&password_lower))
        {
            return true;
        }

        std::iter::once(value_lower.as_str())
            .chain(NON_WORD.split(&value_lower))
            .filter(|part| !part.is_empty())
            .any(|part| similarity_ratio(&password_lower, part) >= self.max_similarity)
    }
}

/// `2 * matches / total_len`, where matches is the longest common subsequence.
fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    2.0 * prev[b.len()] as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("short1", PasswordPolicyError::TooShort { min_length: 8 })]
    #[case("20240301123", PasswordPolicyError::EntirelyNumeric)]
    #[case("Password", PasswordPolicyError::CommonPassword)]
    #[case("alice_wonder", PasswordPolicyError::TooSimilar { attribute: "username" })]
    fn rejects_weak_passwords(#[case] password: &str, #[case] expected: PasswordPolicyError) {
        let errors = PasswordPolicy::default()
            .validate(password, &[("username", "alice_wonder"), ("email", "")])
            .unwrap_err();
        assert!(errors.contains(&expected), "{password}: {errors:?}");
    }

    #[test]
    fn accepts_strong_password() {
        assert!(PasswordPolicy::default()
            .validate(
                "tangerine-harbour-42",
                &[("username", "alice"), ("email", "alice@example.com")]
            )
            .is_ok());
    }

    #[test]
    fn short_personal_values_are_not_matched_as_substrings() {
        // "harbour" contains "bo"
        assert!(PasswordPolicy::default()
            .validate(
                "tangerine-harbour-42",
                &[("username", "bo"), ("full name", "Al")]
            )
            .is_ok());

        let errors = PasswordPolicy::default()
            .validate("harbour-bob-2024", &[("username", "bob")])
            .unwrap_err();
        assert_eq!(
            errors,
            vec![PasswordPolicyError::TooSimilar { attribute: "username" }]
        );
    }

    #[test]
    fn collects_every_failure() {
        let errors = PasswordPolicy::default()
            .validate("123456", &[("username", "bob")])
            .unwrap_err();
        assert!(errors.contains(&PasswordPolicyError::TooShort { min_length: 8 }));
        assert!(errors.contains(&PasswordPolicyError::CommonPassword));
        assert!(errors.contains(&PasswordPolicyError::EntirelyNumeric));
    }

    #[test]
    fn similarity_checks_email_parts() {
        let errors = PasswordPolicy::default()
            .validate("jonathan.k", &[("email", "jonathank@mail.example")])
            .unwrap_err();
        assert_eq!(
            errors,
            vec![PasswordPolicyError::TooSimilar { attribute: "email" }]
        );
    }

    #[test]
    fn ratio_is_symmetric_and_bounded() {
        assert_eq!(similarity_ratio("abcd", "abcd"), 1.0);
        assert_eq!(similarity_ratio("abcd", "wxyz"), 0.0);
        assert_eq!(
            similarity_ratio("kitten", "sitting"),
            similarity_ratio("sitting", "kitten")
        );
    }
}
