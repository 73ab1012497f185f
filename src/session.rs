use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BulkEditMode {
    #[default]
    None,
    SingleCategory(String),
    AllGrades,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("course has no grading categories")]
    EmptyCategoryList,
    #[error("unknown grading category: {0}")]
    UnknownCategory(String),
    #[error("bulk edit is already active")]
    AlreadyActive,
    #[error("category selection requires single-category bulk edit")]
    NotSingleCategory,
}

/// Transient bulk-edit state of the open course view. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct BulkEditSession {
    mode: BulkEditMode,
}

impl BulkEditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &BulkEditMode {
        &self.mode
    }

    pub fn selected_category(&self) -> Option<&str> {
        match &self.mode {
            BulkEditMode::SingleCategory(c) => Some(c.as_str()),
            _ => None,
        }
    }

    /// Enters single-category mode on the first configured category.
    pub fn edit_category(&mut self, categories: &[String]) -> Result<(), TransitionError> {
        if self.mode != BulkEditMode::None {
            return Err(TransitionError::AlreadyActive);
        }
        let Some(first) = categories.first() else {
            return Err(TransitionError::EmptyCategoryList);
        };
        self.mode = BulkEditMode::SingleCategory(first.clone());
        Ok(())
    }

    pub fn edit_all(&mut self) -> Result<(), TransitionError> {
        if self.mode != BulkEditMode::None {
            return Err(TransitionError::AlreadyActive);
        }
        self.mode = BulkEditMode::AllGrades;
        Ok(())
    }

    pub fn select_category(
        &mut self,
        category: &str,
        categories: &[String],
    ) -> Result<(), TransitionError> {
        if !matches!(self.mode, BulkEditMode::SingleCategory(_)) {
            return Err(TransitionError::NotSingleCategory);
        }
        if !categories.iter().any(|c| c == category) {
            return Err(TransitionError::UnknownCategory(category.to_string()));
        }
        self.mode = BulkEditMode::SingleCategory(category.to_string());
        Ok(())
    }

    pub fn exit(&mut self) {
        self.mode = BulkEditMode::None;
    }

    /// Advisory only: drives which cells are rendered as under bulk edit.
    pub fn is_highlighted(&self, cell_category: &str) -> bool {
        match &self.mode {
            BulkEditMode::None => false,
            BulkEditMode::AllGrades => true,
            BulkEditMode::SingleCategory(c) => c == cell_category,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mode = match self.mode() {
            BulkEditMode::None => serde_json::Value::Null,
            BulkEditMode::SingleCategory(_) => json!("single-category"),
            BulkEditMode::AllGrades => json!("all-grades"),
        };
        json!({
            "mode": mode,
            "selectedCategory": self.selected_category(),
        })
    }
}
