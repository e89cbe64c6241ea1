//! Issue body and comment formatting.
//!
//! Every migrated issue body opens with a provenance banner linking back to
//! the source tracker, followed by the converted description and a metadata
//! block recording what the source issue looked like at migration time.

use chrono::{DateTime, FixedOffset};

use crate::markdown::jira_to_markdown;
use crate::types::{JiraComment, JiraIssue};

/// Issue title: `[KEY] summary`.
#[must_use]
pub fn issue_title(issue: &JiraIssue) -> String {
    format!("[{}] {}", issue.key, issue.fields.summary)
}

/// Builds the full issue body from a source issue snapshot.
#[must_use]
pub fn issue_body(issue: &JiraIssue, jira_base_url: &str) -> String {
    let jira_url = issue.browse_url(jira_base_url);
    let description = jira_to_markdown(issue.fields.description.as_deref().unwrap_or(""));

    let status = issue
        .fields
        .status
        .as_ref()
        .map_or("Unknown", |s| s.name.as_str());
    let priority = issue
        .fields
        .priority
        .as_ref()
        .map_or("Unknown", |p| p.name());
    let issue_type = issue
        .fields
        .issuetype
        .as_ref()
        .map_or("Unknown", |t| t.name.as_str());
    let assignee = issue
        .fields
        .assignee
        .as_ref()
        .map_or("Unassigned", |a| a.display_name.as_str());
    let created = format_date(issue.fields.created.as_deref());
    let updated = format_date(issue.fields.updated.as_deref());
    let labels = if issue.fields.labels.is_empty() {
        "None".to_string()
    } else {
        issue.fields.labels.join(", ")
    };

    let attachment_note = if issue.fields.attachment.is_empty() {
        ""
    } else {
        "\n_Attachments will be added in a comment below._"
    };

    format!(
        "> **Migrated from [{key}]({jira_url})**\n\
         \n\
         {description}\n\
         \n\
         ---\n\
         \n\
         ## Original JIRA Metadata\n\
         \n\
         - **Status**: {status}\n\
         - **Priority**: {priority}\n\
         - **Issue Type**: {issue_type}\n\
         - **Assignee**: {assignee}\n\
         - **Created**: {created}\n\
         - **Updated**: {updated}\n\
         - **Original Labels**: {labels}\n\
         {attachment_note}",
        key = issue.key,
    )
}

/// Formats a migrated comment: attribution line plus converted body.
#[must_use]
pub fn format_comment(comment: &JiraComment) -> String {
    let author = comment
        .author
        .as_ref()
        .map_or("Unknown", |a| a.display_name.as_str());
    let created = format_datetime(Some(&comment.created));

    // Mark as edited when the update is more than a minute after creation.
    let edited = match (
        parse_jira_timestamp(&comment.created),
        parse_jira_timestamp(&comment.updated),
    ) {
        (Some(created_at), Some(updated_at))
            if (updated_at - created_at).num_seconds().abs() > 60 =>
        {
            format!(" (edited {})", format_datetime(Some(&comment.updated)))
        }
        _ => String::new(),
    };

    let body = jira_to_markdown(&comment.body);

    format!("> **{author}** commented on {created}{edited}\n\n{body}")
}

/// Parses a JIRA timestamp, accepting RFC 3339 and JIRA's
/// `2024-01-15T10:30:00.000+0000` variant.
fn parse_jira_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.3f%z"))
        .ok()
}

/// Date-only form for the metadata block; unparseable input passes through.
fn format_date(value: Option<&str>) -> String {
    match value {
        Some(v) => parse_jira_timestamp(v)
            .map_or_else(|| v.to_string(), |dt| dt.format("%-d %b %Y").to_string()),
        None => "Unknown".to_string(),
    }
}

/// Date-and-time form for comment attribution.
fn format_datetime(value: Option<&str>) -> String {
    match value {
        Some(v) => parse_jira_timestamp(v).map_or_else(
            || v.to_string(),
            |dt| dt.format("%-d %b %Y %H:%M").to_string(),
        ),
        None => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(json: serde_json::Value) -> JiraIssue {
        serde_json::from_value(json).unwrap()
    }

    fn full_issue() -> JiraIssue {
        issue(serde_json::json!({
            "key": "VIBE-12",
            "id": "12",
            "fields": {
                "summary": "Publish hearing lists",
                "description": "h2. Goal\n*Fast* publishing",
                "status": { "name": "In Progress" },
                "priority": { "name": "2 - High" },
                "issuetype": { "name": "Story" },
                "assignee": { "displayName": "Sam Doe" },
                "created": "2024-01-15T10:30:00.000+0000",
                "updated": "2024-02-01T08:00:00.000+0000",
                "labels": ["CaTH", "publishing"],
                "attachment": [
                    { "id": "1", "filename": "spec.pdf", "content": "https://jira/att/1" }
                ]
            }
        }))
    }

    #[test]
    fn title_embeds_key_and_summary() {
        assert_eq!(issue_title(&full_issue()), "[VIBE-12] Publish hearing lists");
    }

    #[test]
    fn body_contains_banner_converted_description_and_metadata() {
        let body = issue_body(&full_issue(), "https://jira.example.com");

        assert!(body.starts_with(
            "> **Migrated from [VIBE-12](https://jira.example.com/browse/VIBE-12)**"
        ));
        assert!(body.contains("## Goal"));
        assert!(body.contains("**Fast** publishing"));
        assert!(body.contains("- **Status**: In Progress"));
        assert!(body.contains("- **Priority**: 2 - High"));
        assert!(body.contains("- **Assignee**: Sam Doe"));
        assert!(body.contains("- **Created**: 15 Jan 2024"));
        assert!(body.contains("- **Original Labels**: CaTH, publishing"));
        assert!(body.contains("_Attachments will be added in a comment below._"));
    }

    #[test]
    fn body_handles_missing_fields() {
        let body = issue_body(
            &issue(serde_json::json!({
                "key": "VIBE-13",
                "id": "13",
                "fields": { "summary": "Bare" }
            })),
            "https://jira.example.com",
        );

        assert!(body.contains("- **Status**: Unknown"));
        assert!(body.contains("- **Assignee**: Unassigned"));
        assert!(body.contains("- **Original Labels**: None"));
        assert!(!body.contains("_Attachments"));
    }

    #[test]
    fn comment_attribution_and_edit_marker() {
        let comment: JiraComment = serde_json::from_value(serde_json::json!({
            "id": "100",
            "author": { "displayName": "Alex Poe" },
            "body": "Looks *good*",
            "created": "2024-01-15T10:30:00.000+0000",
            "updated": "2024-01-15T11:45:00.000+0000"
        }))
        .unwrap();

        let formatted = format_comment(&comment);

        assert!(formatted.starts_with("> **Alex Poe** commented on 15 Jan 2024 10:30"));
        assert!(formatted.contains("(edited 15 Jan 2024 11:45)"));
        assert!(formatted.ends_with("Looks **good**"));
    }

    #[test]
    fn comment_without_edits_has_no_marker() {
        let comment: JiraComment = serde_json::from_value(serde_json::json!({
            "id": "101",
            "body": "unchanged",
            "created": "2024-01-15T10:30:00.000+0000",
            "updated": "2024-01-15T10:30:30.000+0000"
        }))
        .unwrap();

        let formatted = format_comment(&comment);

        assert!(formatted.starts_with("> **Unknown** commented on"));
        assert!(!formatted.contains("edited"));
    }
}
