use contend_core::Record;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: i64,
    pub name: String,
    pub category: String,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            id: row.id,
            name: row.name,
            category: row.category,
        }
    }
}
