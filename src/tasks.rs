//! Parsing of task-extraction responses.
//!
//! The model is asked for `YYYY-MM-DD, description` lines. Responses are
//! logged verbatim either way; this module only tells the controller which
//! lines break the format so it can warn about them.

use chrono::NaiveDate;

/// One well-formed line of a task-extraction response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLine {
    pub due: NaiveDate,
    pub description: String,
}

/// Result of checking a response against the task format.
#[derive(Debug, Default)]
pub struct TaskParse {
    pub tasks: Vec<TaskLine>,
    /// Non-empty lines that did not match, verbatim.
    pub rejected: Vec<String>,
}

pub fn parse_task_line(line: &str) -> Option<TaskLine> {
    let (date, description) = line.trim().split_once(',')?;
    let due = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let description = description.trim();
    if description.is_empty() {
        return None;
    }
    Some(TaskLine {
        due,
        description: description.to_string(),
    })
}

/// Splits a response into lines and sorts them into tasks and rejects. Blank
/// lines and Markdown code fences are ignored.
pub fn parse_task_lines(response: &str) -> TaskParse {
    let mut parsed = TaskParse::default();
    for line in response.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("```") {
            continue;
        }
        match parse_task_line(trimmed) {
            Some(task) => parsed.tasks.push(task),
            None => parsed.rejected.push(trimmed.to_string()),
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines() {
        let parsed = parse_task_lines(
            "2024-03-15, Odevzdat finanční zprávu\n2024-04-02, Zúčastnit se porady týmu",
        );
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.tasks.len(), 2);
        assert_eq!(
            parsed.tasks[0].due,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
        assert_eq!(parsed.tasks[1].description, "Zúčastnit se porady týmu");
    }

    #[test]
    fn description_may_contain_commas() {
        let task = parse_task_line("2025-08-01, Letní tábor, Šumava").unwrap();
        assert_eq!(task.description, "Letní tábor, Šumava");
    }

    #[test]
    fn rejects_bad_dates_and_chatter() {
        let parsed = parse_task_lines(
            "```\nHere are your tasks:\n2024-02-30, Impossible date\n15.3.2024, Wrong format\n2024-03-15,\n```",
        );
        assert!(parsed.tasks.is_empty());
        assert_eq!(parsed.rejected.len(), 4);
    }
}
