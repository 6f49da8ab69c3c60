// src/notify/message.rs
//! Message builders for the two things the tracker ever says.

use crate::grades::FingerprintedGrade;

use super::NotificationMessage;

pub const NEW_GRADES_TITLE: &str = "New grade(s) available!";
pub const NEW_GRADES_COLOR: u32 = 0x06d6a0;
pub const BAD_NEWS_TITLE: &str = "Bad news!";
pub const BAD_NEWS_COLOR: u32 = 0xed1c24;
pub const FOOTER: &str = "Grades Tracker";

fn number_or_na(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "n/a".to_string())
}

/// One field per grade, in the order given.
pub fn new_grades(grades: &[FingerprintedGrade]) -> NotificationMessage {
    grades.iter().fold(
        NotificationMessage::new(NEW_GRADES_TITLE, NEW_GRADES_COLOR).footer(FOOTER),
        |msg, g| {
            let r = &g.record;
            let name = match &r.subject.full {
                Some(full) => format!("{} | {}", r.subject.short, full),
                None => r.subject.short.clone(),
            };
            let date = r
                .date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_else(|| "n/a".to_string());
            let mut value = format!(
                "Evaluation: {}\nDate: {}\nGrade: `{}`\nCoefficient: `{}`",
                r.evaluation,
                date,
                number_or_na(r.grade),
                number_or_na(r.coefficient)
            );
            if !r.comment.is_empty() {
                value.push_str(&format!("\nComment: {}", r.comment));
            }
            msg.field(name, value)
        },
    )
}

pub fn bad_news(error: &str) -> NotificationMessage {
    NotificationMessage::new(BAD_NEWS_TITLE, BAD_NEWS_COLOR)
        .field("Error", error)
        .footer(FOOTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grades::tests::grade;

    #[test]
    fn grade_fields_render_subject_and_values() {
        let mut pending = grade("2", None);
        pending.subject.full = None;
        pending.comment = "absent".into();
        let graded = FingerprintedGrade::new(grade("1", Some(12.5)));

        let msg = new_grades(&[graded, FingerprintedGrade::new(pending)]);
        assert_eq!(msg.title, NEW_GRADES_TITLE);
        assert_eq!(msg.color, NEW_GRADES_COLOR);
        assert_eq!(msg.fields.len(), 2);

        assert_eq!(msg.fields[0].name, "R1.01 | Initiation au développement");
        assert_eq!(
            msg.fields[0].value,
            "Evaluation: DS 1\nDate: 15/01/2024\nGrade: `12.5`\nCoefficient: `1`"
        );

        assert_eq!(msg.fields[1].name, "R1.01");
        assert!(msg.fields[1].value.contains("Grade: `n/a`"));
        assert!(msg.fields[1].value.ends_with("Comment: absent"));
    }

    #[test]
    fn bad_news_carries_error_text() {
        let msg = bad_news("snapshot state/grades.json is corrupt");
        assert_eq!(msg.title, BAD_NEWS_TITLE);
        assert_eq!(msg.color, BAD_NEWS_COLOR);
        assert_eq!(msg.fields[0].name, "Error");
        assert_eq!(msg.fields[0].value, "snapshot state/grades.json is corrupt");
    }
}
