use smol_str::SmolStr;

use crate::value::DataType;

/// Describes one output column of a plan node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: SmolStr,
    pub data_type: DataType,
    pub nullable: bool,
    /// Empty for unqualified columns; the owning table name otherwise. Used
    /// to disambiguate joins and to tag subquery-alias output.
    pub source_table: SmolStr,
}

impl Column {
    pub fn new(name: impl Into<SmolStr>, data_type: DataType, nullable: bool) -> Self {
        Column {
            name: name.into(),
            data_type,
            nullable,
            source_table: SmolStr::default(),
        }
    }

    pub fn with_source_table(mut self, table: impl Into<SmolStr>) -> Self {
        self.source_table = table.into();
        self
    }
}

/// An ordered sequence of column descriptors. Two schemas compare
/// structurally via derived `PartialEq` on the backing `Vec`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema(pub Vec<Column>);

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Schema(columns)
    }

    pub fn empty() -> Self {
        Schema(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.0.iter()
    }

    /// Index of the first column matching `name`, optionally qualified by
    /// `table`. Returns `Ok(None)` when nothing matches, and
    /// `Err(PlanError::AmbiguousColumn)` when more than one column matches an
    /// unqualified lookup.
    pub fn resolve_column(
        &self,
        table: Option<&str>,
        name: &str,
    ) -> Result<Option<usize>, crate::error::PlanError> {
        let mut found = None;
        for (idx, col) in self.0.iter().enumerate() {
            if !col.name.eq_ignore_ascii_case(name) {
                continue;
            }
            if let Some(table) = table {
                if !col.source_table.eq_ignore_ascii_case(table) {
                    continue;
                }
                return Ok(Some(idx));
            }
            if found.is_some() {
                return Err(crate::error::PlanError::AmbiguousColumn(name.into()));
            }
            found = Some(idx);
        }
        Ok(found)
    }

    pub fn with_source_table(&self, table: impl Into<SmolStr>) -> Schema {
        let table = table.into();
        Schema(
            self.0
                .iter()
                .cloned()
                .map(|col| col.with_source_table(table.clone()))
                .collect(),
        )
    }
}

impl FromIterator<Column> for Schema {
    fn from_iter<T: IntoIterator<Item = Column>>(iter: T) -> Self {
        Schema(iter.into_iter().collect())
    }
}

impl IntoIterator for Schema {
    type Item = Column;
    type IntoIter = std::vec::IntoIter<Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("a", DataType::Int, false).with_source_table("t"),
            Column::new("b", DataType::Text, true).with_source_table("t"),
        ])
    }

    #[test]
    fn resolves_unqualified_column() {
        assert_eq!(schema().resolve_column(None, "b").unwrap(), Some(1));
    }

    #[test]
    fn resolves_qualified_column() {
        assert_eq!(schema().resolve_column(Some("t"), "a").unwrap(), Some(0));
    }

    #[test]
    fn missing_column_is_none() {
        assert_eq!(schema().resolve_column(None, "z").unwrap(), None);
    }

    #[test]
    fn ambiguous_column_errors() {
        let s = Schema::new(vec![
            Column::new("a", DataType::Int, false).with_source_table("t1"),
            Column::new("a", DataType::Int, false).with_source_table("t2"),
        ]);
        assert!(s.resolve_column(None, "a").is_err());
    }
}
