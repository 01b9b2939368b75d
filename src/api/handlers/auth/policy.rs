//! Structural password-strength policy.

/// Named policy parameters: length bounds and required character classes.
/// Thresholds are configuration, not part of the flow contract.
#[derive(Clone, Debug)]
pub struct PasswordPolicy {
    min_length: usize,
    max_length: usize,
    require_uppercase: bool,
    require_lowercase: bool,
    require_digit: bool,
    require_symbol: bool,
}

const DEFAULT_MIN_LENGTH: usize = 10;
const DEFAULT_MAX_LENGTH: usize = 72;

impl PasswordPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_symbol: true,
        }
    }

    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    #[must_use]
    pub fn with_require_uppercase(mut self, required: bool) -> Self {
        self.require_uppercase = required;
        self
    }

    #[must_use]
    pub fn with_require_lowercase(mut self, required: bool) -> Self {
        self.require_lowercase = required;
        self
    }

    #[must_use]
    pub fn with_require_digit(mut self, required: bool) -> Self {
        self.require_digit = required;
        self
    }

    #[must_use]
    pub fn with_require_symbol(mut self, required: bool) -> Self {
        self.require_symbol = required;
        self
    }

    /// Structural check only; reuse and credential checks happen later in
    /// the flow, after the cheap rejections.
    #[must_use]
    pub fn is_valid(&self, password: &str) -> bool {
        let length = password.chars().count();
        if length < self.min_length || length > self.max_length {
            return false;
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            return false;
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            return false;
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return false;
        }
        if self.require_symbol
            && !password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
        {
            return false;
        }
        true
    }

    /// Client-facing description of the configured requirements.
    #[must_use]
    pub fn requirements_message(&self) -> String {
        let mut parts = vec![format!("at least {} characters", self.min_length)];
        if self.require_uppercase {
            parts.push("an uppercase letter".to_string());
        }
        if self.require_lowercase {
            parts.push("a lowercase letter".to_string());
        }
        if self.require_digit {
            parts.push("a digit".to_string());
        }
        if self.require_symbol {
            parts.push("a symbol".to_string());
        }
        format!("Password must contain {}", parts.join(", "))
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new()
    }
}
