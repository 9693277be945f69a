//! Backup target descriptors.

/// One table to export, with an optional backend-specific row filter.
///
/// An empty `filter_expression` selects all rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupTarget {
    table_name: String,
    filter_expression: String,
}

impl BackupTarget {
    pub fn new(table_name: impl Into<String>, filter_expression: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            filter_expression: filter_expression.into(),
        }
    }

    /// Targets every row of `table_name`.
    pub fn whole_table(table_name: impl Into<String>) -> Self {
        Self::new(table_name, String::new())
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn filter_expression(&self) -> &str {
        &self.filter_expression
    }
}

/// Non-empty, ordered set of targets handed to a backup client in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    targets: Vec<BackupTarget>,
}

impl BackupPlan {
    pub fn single(target: BackupTarget) -> Self {
        Self {
            targets: vec![target],
        }
    }

    /// Builds a plan from `targets`, returning `None` when it is empty.
    pub fn new(targets: Vec<BackupTarget>) -> Option<Self> {
        if targets.is_empty() {
            return None;
        }
        Some(Self { targets })
    }

    /// Appends more targets after the existing ones.
    pub fn extend(&mut self, targets: impl IntoIterator<Item = BackupTarget>) {
        self.targets.extend(targets);
    }

    pub fn targets(&self) -> &[BackupTarget] {
        &self.targets
    }

    pub fn primary(&self) -> &BackupTarget {
        &self.targets[0]
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always `false`; a plan holds at least one target.
    pub fn is_empty(&self) -> bool {
        false
    }
}
