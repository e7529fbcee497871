use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub course_id: i64,
    pub course_code: String,
    pub name: String,
    pub description: String,
    pub capacity: i32,
    pub subject: String,
}

/// Course fields as submitted by the create and edit forms. Capacity is kept
/// as the submitted text so a rejected form shows it back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseInput {
    #[serde(default, deserialize_with = "lenient_id")]
    pub course_id: i64,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capacity: String,
    #[serde(default)]
    pub subject: String,
}

/// A submitted id that is not an integer binds as 0.
fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

fn parse_capacity(raw: &str) -> Result<i32, FieldError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FieldError {
            field: "capacity",
            message: "Capacity is required.",
        });
    }

    match raw.parse::<i32>() {
        Ok(capacity) if capacity >= 0 => Ok(capacity),
        Ok(_) => Err(FieldError {
            field: "capacity",
            message: "Capacity must not be negative.",
        }),
        Err(_) => Err(FieldError {
            field: "capacity",
            message: "Capacity must be a whole number.",
        }),
    }
}

impl CourseInput {
    /// Checks the field constraints and returns every violation, in field order.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        let required = [
            ("course_code", &self.course_code, "Course code is required."),
            ("name", &self.name, "Name is required."),
            ("description", &self.description, "Description is required."),
        ];
        for (field, value, message) in required {
            if value.trim().is_empty() {
                errors.push(FieldError { field, message });
            }
        }

        if let Err(e) = parse_capacity(&self.capacity) {
            errors.push(e);
        }

        if self.subject.trim().is_empty() {
            errors.push(FieldError {
                field: "subject",
                message: "Subject is required.",
            });
        }

        errors
    }

    /// Converts valid input into a course. Invalid input comes back with its
    /// violations.
    pub fn into_course(self) -> Result<Course, (CourseInput, Vec<FieldError>)> {
        let errors = self.validate();
        let capacity = match parse_capacity(&self.capacity) {
            Ok(capacity) if errors.is_empty() => capacity,
            _ => return Err((self, errors)),
        };

        Ok(Course {
            course_id: self.course_id,
            course_code: self.course_code,
            name: self.name,
            description: self.description,
            capacity,
            subject: self.subject,
        })
    }
}

impl From<Course> for CourseInput {
    fn from(course: Course) -> Self {
        Self {
            course_id: course.course_id,
            course_code: course.course_code,
            name: course.name,
            description: course.description,
            capacity: course.capacity.to_string(),
            subject: course.subject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intro_to_cs() -> CourseInput {
        CourseInput {
            course_id: 0,
            course_code: "CSCI101".to_string(),
            name: "Introduction to Computer Science".to_string(),
            description: "Fundamental concepts of computer science.".to_string(),
            capacity: "30".to_string(),
            subject: "Computer Science".to_string(),
        }
    }

    #[test]
    fn test_valid_course_has_no_errors() {
        assert!(intro_to_cs().validate().is_empty());
        let course = intro_to_cs().into_course().unwrap();
        assert_eq!(course.capacity, 30);
    }

    #[test]
    fn test_blank_fields_and_negative_capacity_are_reported() {
        let input = CourseInput {
            course_code: "  ".to_string(),
            name: String::new(),
            capacity: "-1".to_string(),
            ..intro_to_cs()
        };

        let fields: Vec<&str> = input.validate().iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["course_code", "name", "capacity"]);
    }

    #[test]
    fn test_zero_capacity_is_allowed() {
        let input = CourseInput {
            capacity: "0".to_string(),
            ..intro_to_cs()
        };
        assert!(input.validate().is_empty());
    }

    #[test]
    fn test_unparsable_capacity_is_kept_and_reported() {
        let input = CourseInput {
            capacity: "abc".to_string(),
            ..intro_to_cs()
        };

        let (rejected, errors) = input.clone().into_course().unwrap_err();
        assert_eq!(rejected, input);
        assert_eq!(
            errors,
            vec![FieldError {
                field: "capacity",
                message: "Capacity must be a whole number.",
            }]
        );

        let blank = CourseInput {
            capacity: " ".to_string(),
            ..intro_to_cs()
        };
        assert_eq!(blank.validate()[0].message, "Capacity is required.");
    }
}
