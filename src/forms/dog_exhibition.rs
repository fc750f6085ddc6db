//! Combined dog + exhibition entry.
//!
//! A new dog is saved together with an optional first exhibition record. Both
//! inserts share one transaction: the dog row only persists when the
//! exhibition row (if requested) is stored as well.

use super::{
    FieldKind, FieldValue, Form, FormField, FormValues, MEDAL_CHOICES, generate_form,
    insert_statement, lookup_value,
};
use crate::db::{SchemaInspector, Session, SessionTx};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam};
use tracing::{info, warn};

pub const DOGS_TABLE: &str = "Dogs";
pub const EXHIBITIONS_TABLE: &str = "Exhibitions";

/// Dog fields that must be filled before anything is written.
pub const DOG_REQUIRED_FIELDS: [&str; 4] = ["id_breed", "owner", "assesment", "gender"];

/// Lowest and highest exhibition mark.
pub const MARK_RANGE: std::ops::RangeInclusive<i64> = 1..=12;

/// Fixed exhibition section: (column, label, required, kind).
const EXHIBITION_FIELDS: [(&str, &str, bool, FieldKind); 4] = [
    ("date_exhibition", "Exhibition date", true, FieldKind::Date),
    ("mark", "Mark (1-12)", true, FieldKind::Text),
    ("medal", "Medal", false, FieldKind::Choice(MEDAL_CHOICES)),
    ("name", "Exhibition name", true, FieldKind::Text),
];

/// Result of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedDog {
    pub dog_id: i64,
    pub exhibition_saved: bool,
}

#[derive(Debug, Clone)]
pub struct DogExhibitionForm {
    pub dog: Form,
    /// Exhibition fields with their display labels.
    pub exhibition: Vec<(&'static str, FormField)>,
}

impl DogExhibitionForm {
    /// Read both table descriptors and build the combined form.
    pub async fn generate(session: &Session) -> DbResult<Self> {
        let mut dog = generate_form(session, DOGS_TABLE).await?;
        dog.require(&DOG_REQUIRED_FIELDS);

        let descriptor = SchemaInspector::describe_table(session.pool(), EXHIBITIONS_TABLE).await?;
        let mut exhibition = Vec::with_capacity(EXHIBITION_FIELDS.len());
        for (column, label, required, kind) in EXHIBITION_FIELDS {
            let definition = descriptor.column(column).cloned().ok_or_else(|| {
                DbError::schema(
                    format!("Column '{}' not found in {}", column, EXHIBITIONS_TABLE),
                    EXHIBITIONS_TABLE,
                )
            })?;
            let field = FormField::new(definition)
                .with_kind(kind)
                .with_required(required);
            exhibition.push((label, field));
        }

        Ok(Self { dog, exhibition })
    }

    /// The exhibition section counts as filled once any required field has a value.
    pub fn exhibition_requested(&self, values: &FormValues) -> bool {
        self.exhibition.iter().any(|(_, field)| {
            field.required
                && lookup_value(values, field.name()).is_some_and(|v| !v.trim().is_empty())
        })
    }

    /// Coerce the exhibition section.
    ///
    /// Filled fields are validated; required fields left empty are still sent
    /// as empty text and rejected by the database, aborting the whole save.
    pub fn exhibition_values(&self, values: &FormValues) -> DbResult<Vec<FieldValue>> {
        let mut coerced = Vec::new();
        for (_, field) in &self.exhibition {
            let raw = lookup_value(values, field.name()).unwrap_or("");
            match field.coerce(raw)? {
                Some(value) => {
                    if field.name().eq_ignore_ascii_case("mark") {
                        check_mark(&value.param)?;
                    }
                    coerced.push(value);
                }
                None if field.required => {
                    coerced.push(field.field_value(QueryParam::String(raw.trim().to_string())));
                }
                None => {}
            }
        }
        Ok(coerced)
    }

    /// Validate everything, then insert the dog and (optionally) its exhibition
    /// in one transaction.
    pub async fn save(
        &self,
        session: &Session,
        dog_values: &FormValues,
        exhibition_values: &FormValues,
    ) -> DbResult<SavedDog> {
        let dog = self.dog.coerce(dog_values)?;
        let exhibition = if self.exhibition_requested(exhibition_values) {
            Some(self.exhibition_values(exhibition_values)?)
        } else {
            None
        };

        let mut tx = session.begin().await?;
        match insert_all(&mut tx, session.db_type(), &dog, exhibition).await {
            Ok(saved) => {
                tx.commit().await?;
                info!(
                    dog_id = saved.dog_id,
                    exhibition = saved.exhibition_saved,
                    "Dog saved"
                );
                Ok(saved)
            }
            Err(e) => {
                warn!(error = %e, "Dog save failed, rolling back");
                Err(tx.abort(e).await)
            }
        }
    }
}

async fn insert_all(
    tx: &mut SessionTx,
    dialect: DatabaseType,
    dog: &[FieldValue],
    exhibition: Option<Vec<FieldValue>>,
) -> DbResult<SavedDog> {
    let statement = insert_statement(dialect, DOGS_TABLE, dog, Some("id_dog"))?;
    let returned = tx.fetch(&statement).await?;
    let dog_id = returned
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(|cell| cell.as_i64())
        .ok_or_else(|| DbError::internal("Dog insert returned no id"))?;

    let Some(mut exhibition) = exhibition else {
        return Ok(SavedDog {
            dog_id,
            exhibition_saved: false,
        });
    };

    exhibition.push(FieldValue::new("id_dog", QueryParam::Int(dog_id)));
    let statement = insert_statement(dialect, EXHIBITIONS_TABLE, &exhibition, None)?;
    tx.execute(&statement).await?;

    Ok(SavedDog {
        dog_id,
        exhibition_saved: true,
    })
}

fn check_mark(param: &QueryParam) -> DbResult<()> {
    match param {
        QueryParam::Int(mark) if MARK_RANGE.contains(mark) => Ok(()),
        _ => Err(DbError::validation(format!(
            "Mark must be a whole number from {} to {}",
            MARK_RANGE.start(),
            MARK_RANGE.end()
        ))),
    }
}
