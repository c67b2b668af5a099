//! Rule Evaluator (C5): a pure, stateless boolean DNF over email attributes
//! (§4.5). Grounded on `internal/webhook/rules.go` from the original
//! implementation; the field/operator tag-union is modeled here as the
//! `RuleField`/`RuleOperator` sum types from `types::webhook` rather than
//! free-form strings, per §9's design note — unknown field/operator
//! combinations still evaluate to `false` rather than erroring.

use std::collections::BTreeMap;

use regex::RegexBuilder;
use types::{Email, RuleField, RuleOperator, WebhookRule};

/// Evaluates `rules` against `email`. Rules sharing a `rule_group` are
/// AND-combined; distinct groups are OR-combined (disjunctive normal
/// form). An empty ruleset always matches.
pub fn evaluate(rules: &[WebhookRule], email: &Email) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut groups: BTreeMap<i64, Vec<&WebhookRule>> = BTreeMap::new();
    for rule in rules {
        groups.entry(rule.rule_group).or_default().push(rule);
    }

    groups.values().any(|group| group.iter().all(|rule| evaluate_rule(rule, email)))
}

fn evaluate_rule(rule: &WebhookRule, email: &Email) -> bool {
    let Some(field) = RuleField::parse(&rule.field) else {
        return false;
    };

    if field == RuleField::HasAttachments {
        let expected = rule.value.eq_ignore_ascii_case("true");
        return email.has_attachments() == expected;
    }

    if field == RuleField::Size {
        let Ok(threshold) = rule.value.parse::<i64>() else {
            return false;
        };
        return match RuleOperator::parse(&rule.operator) {
            Some(RuleOperator::Gt) => email.raw_size > threshold,
            Some(RuleOperator::Lt) => email.raw_size < threshold,
            _ => false,
        };
    }

    let field_value: String = match field {
        RuleField::Subject => email.subject.clone().unwrap_or_default(),
        RuleField::From => email.from_address.clone(),
        RuleField::To => email.to_address.clone(),
        RuleField::Body => email.rule_body().to_string(),
        RuleField::Header => rule
            .header_name
            .as_deref()
            .and_then(|name| email.headers.get(name))
            .cloned()
            .unwrap_or_default(),
        RuleField::HasAttachments | RuleField::Size => unreachable!("handled above"),
    };

    let Some(operator) = RuleOperator::parse(&rule.operator) else {
        return false;
    };

    match operator {
        RuleOperator::Contains => field_value.to_lowercase().contains(&rule.value.to_lowercase()),
        RuleOperator::NotContains => !field_value.to_lowercase().contains(&rule.value.to_lowercase()),
        RuleOperator::Equals => field_value.eq_ignore_ascii_case(&rule.value),
        RuleOperator::Regex => RegexBuilder::new(&rule.value)
            .build()
            .map(|re| re.is_match(&field_value))
            .unwrap_or(false),
        RuleOperator::Gt | RuleOperator::Lt => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use types::Id;

    fn email_with(subject: &str, raw_size: i64, attachments: usize) -> Email {
        Email {
            id: Id::new(1),
            mailbox_id: Id::new(1),
            message_id: None,
            from_address: "sender@ext.test".into(),
            to_address: "support@example.com".into(),
            subject: Some(subject.to_string()),
            date: None,
            headers: Default::default(),
            text_body: Some("hello body".into()),
            html_body: None,
            raw_size,
            received_at: Utc::now(),
            is_read: false,
            attachments: (0..attachments)
                .map(|i| types::Attachment {
                    id: Id::new(i as i64 + 1),
                    email_id: Id::new(1),
                    filename: "f".into(),
                    content_type: "application/octet-stream".into(),
                    size: 1,
                    storage_path: "p".into(),
                    created_at: Utc::now(),
                })
                .collect(),
        }
    }

    fn rule(group: i64, field: &str, operator: &str, value: &str, header_name: Option<&str>) -> WebhookRule {
        WebhookRule {
            id: Id::new(1),
            webhook_id: Id::new(1),
            rule_group: group,
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
            header_name: header_name.map(str::to_string),
        }
    }

    #[test]
    fn empty_ruleset_always_matches() {
        assert!(evaluate(&[], &email_with("anything", 10, 0)));
    }

    #[test]
    fn contains_is_case_insensitive() {
        let rules = [rule(1, "subject", "contains", "TICKET", None)];
        assert!(evaluate(&rules, &email_with("Hi ticket 42", 10, 0)));
        assert!(!evaluate(&rules, &email_with("Hello", 10, 0)));
    }

    #[test]
    fn groups_are_and_combined_and_or_across_groups() {
        let rules = [
            rule(1, "subject", "contains", "ticket", None),
            rule(1, "from", "equals", "sender@ext.test", None),
            rule(2, "size", "gt", "1000", None),
        ];
        // group 1 fully matches
        assert!(evaluate(&rules, &email_with("Hi ticket 42", 10, 0)));
        // group 1 fails (from mismatch) but group 2 matches via size
        let rules2 = [
            rule(1, "subject", "contains", "ticket", None),
            rule(1, "from", "equals", "nobody@else.test", None),
            rule(2, "size", "gt", "5", None),
        ];
        assert!(evaluate(&rules2, &email_with("no match", 10, 0)));
    }

    #[test]
    fn has_attachments_ignores_operator() {
        let rules = [rule(1, "has_attachments", "contains", "true", None)];
        assert!(evaluate(&rules, &email_with("x", 1, 1)));
        assert!(!evaluate(&rules, &email_with("x", 1, 0)));
    }

    #[test]
    fn size_only_supports_gt_lt() {
        let rules = [rule(1, "size", "equals", "10", None)];
        assert!(!evaluate(&rules, &email_with("x", 10, 0)));
    }

    #[test]
    fn unknown_field_or_operator_is_false() {
        let rules = [rule(1, "nonsense", "contains", "x", None)];
        assert!(!evaluate(&rules, &email_with("x", 1, 0)));
        let rules2 = [rule(1, "subject", "nonsense", "x", None)];
        assert!(!evaluate(&rules2, &email_with("x", 1, 0)));
    }

    #[test]
    fn bad_regex_evaluates_to_no_match() {
        let rules = [rule(1, "subject", "regex", "(unclosed", None)];
        assert!(!evaluate(&rules, &email_with("x", 1, 0)));
    }

    #[test]
    fn header_lookup_uses_header_name() {
        let mut email = email_with("x", 1, 0);
        email.headers.insert("X-Priority".to_string(), "high".to_string());
        let rules = [rule(1, "header", "equals", "high", Some("X-Priority"))];
        assert!(evaluate(&rules, &email));
        let rules_missing = [rule(1, "header", "equals", "high", Some("X-Other"))];
        assert!(!evaluate(&rules_missing, &email));
    }
}
