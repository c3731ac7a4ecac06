//! Token usage accounting.
//!
//! Provides [`Usage`], the token counters reported by vendors, and the two
//! ways of combining them: [`Usage::merge`] across turns and
//! [`Usage::overlay`] within a single turn.

use serde::{Deserialize, Serialize};

/// Token counters for one or more vendor turns.
///
/// The optional counters stay `None` until some vendor reports them, so a
/// consumer can tell "zero cache reads" apart from "this vendor does not
/// report cache reads".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Input tokens billed for the prompt.
    pub prompt_tokens: u64,
    /// Output tokens generated by the model.
    pub completion_tokens: u64,
    /// Input tokens written to the vendor's prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_input_tokens: Option<u64>,
    /// Input tokens served from the vendor's prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    /// Tokens spent on reasoning/thinking output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_tokens: Option<u64>,
}

impl Usage {
    /// Create usage with only the prompt and completion counters set.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::Usage;
    ///
    /// let usage = Usage::new(10, 5);
    /// assert_eq!(usage.total_tokens(), 15);
    /// assert_eq!(usage.thought_tokens, None);
    /// ```
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            ..Self::default()
        }
    }

    /// Sum of prompt and completion tokens, saturating at `u64::MAX`.
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    /// Sum two usage values field by field, saturating at `u64::MAX`.
    ///
    /// Optional counters are summed treating a missing side as zero, but only
    /// when at least one side reports the counter; otherwise the result stays
    /// absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use tributary_core::Usage;
    ///
    /// let first = Usage::new(10, 5);
    /// let mut second = Usage::new(3, 2);
    /// second.cache_read_input_tokens = Some(4);
    ///
    /// let total = first.merge(&second);
    /// assert_eq!(total.prompt_tokens, 13);
    /// assert_eq!(total.completion_tokens, 7);
    /// assert_eq!(total.cache_read_input_tokens, Some(4));
    /// assert_eq!(total.cache_write_input_tokens, None);
    /// ```
    #[must_use]
    pub fn merge(&self, other: &Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(other.completion_tokens),
            cache_write_input_tokens: sum_optional(
                self.cache_write_input_tokens,
                other.cache_write_input_tokens,
            ),
            cache_read_input_tokens: sum_optional(
                self.cache_read_input_tokens,
                other.cache_read_input_tokens,
            ),
            thought_tokens: sum_optional(self.thought_tokens, other.thought_tokens),
        }
    }

    /// Apply a partial usage report from the same turn.
    ///
    /// Vendors such as Anthropic report counters more than once per turn
    /// (input tokens at message start, cumulative output tokens at the end).
    /// Each reported counter replaces the previous value instead of adding
    /// to it.
    pub fn overlay(&mut self, update: &UsageUpdate) {
        if let Some(prompt) = update.prompt_tokens {
            self.prompt_tokens = prompt;
        }
        if let Some(completion) = update.completion_tokens {
            self.completion_tokens = completion;
        }
        if update.cache_write_input_tokens.is_some() {
            self.cache_write_input_tokens = update.cache_write_input_tokens;
        }
        if update.cache_read_input_tokens.is_some() {
            self.cache_read_input_tokens = update.cache_read_input_tokens;
        }
        if update.thought_tokens.is_some() {
            self.thought_tokens = update.thought_tokens;
        }
    }
}

/// A partial usage report extracted from a single chunk.
///
/// Every counter is optional because vendors only report what they know at
/// the point the chunk is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageUpdate {
    /// Prompt tokens, if reported in this chunk.
    pub prompt_tokens: Option<u64>,
    /// Completion tokens, if reported in this chunk.
    pub completion_tokens: Option<u64>,
    /// Cache write tokens, if reported in this chunk.
    pub cache_write_input_tokens: Option<u64>,
    /// Cache read tokens, if reported in this chunk.
    pub cache_read_input_tokens: Option<u64>,
    /// Reasoning tokens, if reported in this chunk.
    pub thought_tokens: Option<u64>,
}

impl UsageUpdate {
    /// Whether the update carries no counters at all.
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none()
            && self.completion_tokens.is_none()
            && self.cache_write_input_tokens.is_none()
            && self.cache_read_input_tokens.is_none()
            && self.thought_tokens.is_none()
    }
}

fn sum_optional(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sums_required_counters() {
        let total = Usage::new(10, 5).merge(&Usage::new(3, 2));
        assert_eq!(total, Usage::new(13, 7));
    }

    #[test]
    fn test_merge_optional_absent_on_both_sides_stays_absent() {
        let total = Usage::new(1, 1).merge(&Usage::new(1, 1));
        assert_eq!(total.cache_write_input_tokens, None);
        assert_eq!(total.cache_read_input_tokens, None);
        assert_eq!(total.thought_tokens, None);
    }

    #[test]
    fn test_merge_optional_one_side_treats_other_as_zero() {
        let mut a = Usage::new(1, 1);
        a.thought_tokens = Some(7);
        let b = Usage::new(2, 2);

        assert_eq!(a.merge(&b).thought_tokens, Some(7));
        assert_eq!(b.merge(&a).thought_tokens, Some(7));
    }

    #[test]
    fn test_merge_optional_both_sides_sum() {
        let mut a = Usage::new(0, 0);
        a.cache_read_input_tokens = Some(4);
        let mut b = Usage::new(0, 0);
        b.cache_read_input_tokens = Some(6);

        assert_eq!(a.merge(&b).cache_read_input_tokens, Some(10));
    }

    #[test]
    fn test_huge_vendor_counters_saturate() {
        let mut a = Usage::new(u64::MAX, u64::MAX);
        a.thought_tokens = Some(u64::MAX);
        let mut b = Usage::new(1, 2);
        b.thought_tokens = Some(3);

        let total = a.merge(&b);
        assert_eq!(total.prompt_tokens, u64::MAX);
        assert_eq!(total.completion_tokens, u64::MAX);
        assert_eq!(total.thought_tokens, Some(u64::MAX));
        assert_eq!(total.total_tokens(), u64::MAX);
    }

    #[test]
    fn test_overlay_replaces_reported_counters() {
        let mut usage = Usage::default();
        usage.overlay(&UsageUpdate {
            prompt_tokens: Some(25),
            completion_tokens: Some(1),
            ..UsageUpdate::default()
        });
        usage.overlay(&UsageUpdate {
            completion_tokens: Some(40),
            ..UsageUpdate::default()
        });

        assert_eq!(usage.prompt_tokens, 25);
        assert_eq!(usage.completion_tokens, 40);
    }

    #[test]
    fn test_usage_update_is_empty() {
        assert!(UsageUpdate::default().is_empty());
        let update = UsageUpdate {
            thought_tokens: Some(3),
            ..UsageUpdate::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_usage_serialization_skips_absent_optionals() {
        let json = serde_json::to_value(Usage::new(3, 4)).unwrap();
        assert_eq!(json["promptTokens"], 3);
        assert_eq!(json["completionTokens"], 4);
        assert!(json.get("thoughtTokens").is_none());
    }
}
