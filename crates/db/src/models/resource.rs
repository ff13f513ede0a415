use sqlx::FromRow;
use vorder_core::content::CategoryWeight;
use vorder_core::store::ImageRef;
use vorder_core::types::DbId;

/// An image claimed from `resource_images`, with its category code.
#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub id: DbId,
    pub category_code: Option<String>,
    pub file_url: String,
}

impl From<ImageRow> for ImageRef {
    fn from(row: ImageRow) -> Self {
        ImageRef {
            id: row.id,
            category: row.category_code,
            file_url: row.file_url,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryRow {
    pub category_code: String,
    pub weight: i32,
}

impl From<CategoryRow> for CategoryWeight {
    fn from(row: CategoryRow) -> Self {
        CategoryWeight {
            code: row.category_code,
            weight: u32::try_from(row.weight).unwrap_or(0),
        }
    }
}
