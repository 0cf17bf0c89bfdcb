use std::collections::HashSet;
use std::sync::Arc;

use embedsql_core::{CatalogHandle, Context, Expression, JoinKind, PlanError, PlanResult, Row, RowIter, Table, Value};

/// Concatenates rows across every partition a table reports, in order.
/// Partitioning is a storage-engine concern; the executor just drains them.
pub struct TableScanIter {
    table: Arc<dyn Table>,
    ctx: Context,
    partitions: Box<dyn Iterator<Item = embedsql_core::Partition> + Send>,
    current: Option<Box<dyn RowIter>>,
}

impl TableScanIter {
    pub fn new(table: Arc<dyn Table>, ctx: Context) -> PlanResult<Self> {
        let partitions = table.partitions(&ctx)?;
        Ok(TableScanIter {
            table,
            ctx,
            partitions,
            current: None,
        })
    }
}

impl RowIter for TableScanIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        loop {
            self.ctx.cancellation.check()?;
            if let Some(iter) = self.current.as_mut() {
                if let Some(row) = iter.next()? {
                    return Ok(Some(row));
                }
                iter.close()?;
                self.current = None;
            }
            match self.partitions.next() {
                Some(partition) => {
                    self.current = Some(self.table.partition_rows(&self.ctx, &partition)?);
                }
                None => return Ok(None),
            }
        }
    }
}

pub struct ProjectIter {
    pub exprs: Vec<Expression>,
    pub child: Box<dyn RowIter>,
}

impl RowIter for ProjectIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        match self.child.next()? {
            Some(row) => Ok(Some(
                self.exprs.iter().map(|e| e.eval(&row)).collect::<PlanResult<Vec<_>>>()?,
            )),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> PlanResult<()> {
        self.child.close()
    }
}

pub struct FilterIter {
    pub predicate: Expression,
    pub child: Box<dyn RowIter>,
}

impl RowIter for FilterIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        while let Some(row) = self.child.next()? {
            if matches!(self.predicate.eval(&row)?, Value::Bool(true)) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> PlanResult<()> {
        self.child.close()
    }
}

/// Drains its child eagerly and sorts the buffered rows; the only operator
/// besides `GroupBy` that has to materialize its whole input before
/// producing a single row, hence the explicit memory reservation.
pub struct SortIter {
    rows: std::vec::IntoIter<Row>,
}

impl SortIter {
    pub fn new(
        fields: &[embedsql_core::SortField],
        mut child: Box<dyn RowIter>,
        ctx: &Context,
    ) -> PlanResult<Self> {
        let mut rows = Vec::new();
        while let Some(row) = child.next()? {
            ctx.memory.reserve(row_size(&row))?;
            rows.push(row);
        }
        child.close()?;
        let mut err = None;
        rows.sort_by(|a, b| {
            for field in fields {
                let (Ok(av), Ok(bv)) = (field.expr.eval(a), field.expr.eval(b)) else {
                    err = Some(PlanError::TypeError("cannot sort incomparable values".into()));
                    return std::cmp::Ordering::Equal;
                };
                let ord = compare(&av, &bv);
                let ord = if field.descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(SortIter {
            rows: rows.into_iter(),
        })
    }
}

impl RowIter for SortIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => std::cmp::Ordering::Equal,
        (Value::Null, _) => std::cmp::Ordering::Less,
        (_, Value::Null) => std::cmp::Ordering::Greater,
        _ => std::cmp::Ordering::Equal,
    }
}

fn row_size(row: &Row) -> u64 {
    row.len() as u64 * 16
}

/// Materializes its child, groups rows by the group-by expressions'
/// values, and folds each group's aggregate select expressions over its
/// member rows. Non-aggregate select expressions (the grouping columns
/// themselves) are evaluated against the group's first row.
pub struct GroupByIter {
    rows: std::vec::IntoIter<Row>,
}

impl GroupByIter {
    pub fn new(
        select_exprs: &[Expression],
        group_by_exprs: &[Expression],
        mut child: Box<dyn RowIter>,
        ctx: &Context,
    ) -> PlanResult<Self> {
        let mut groups: Vec<(Vec<Value>, Vec<Row>)> = Vec::new();
        while let Some(row) = child.next()? {
            ctx.memory.reserve(row_size(&row))?;
            let key = group_by_exprs
                .iter()
                .map(|e| e.eval(&row))
                .collect::<PlanResult<Vec<_>>>()?;
            match groups.iter_mut().find(|(k, _)| k == &key) {
                Some(group) => group.1.push(row),
                None => groups.push((key, vec![row])),
            }
        }
        child.close()?;
        let mut rows = Vec::new();
        for (_, group_rows) in groups {
            let mut out_row = Vec::with_capacity(select_exprs.len());
            for expr in select_exprs {
                match expr {
                    Expression::Aggregate { kind, arg, .. } => {
                        let mut state = None;
                        let mut count = 0i64;
                        for row in &group_rows {
                            let value = arg.eval(row)?;
                            state = Some(kind.fold(state, value)?);
                            count += 1;
                        }
                        out_row.push(kind.finish(state, count));
                    }
                    other => out_row.push(other.eval(&group_rows[0])?),
                }
            }
            rows.push(out_row);
        }
        Ok(GroupByIter {
            rows: rows.into_iter(),
        })
    }
}

impl RowIter for GroupByIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

pub struct LimitIter {
    pub remaining: i64,
    pub child: Box<dyn RowIter>,
}

impl RowIter for LimitIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        if self.remaining <= 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.child.next()
    }

    fn close(&mut self) -> PlanResult<()> {
        self.child.close()
    }
}

pub struct OffsetIter {
    pub remaining: i64,
    pub child: Box<dyn RowIter>,
}

impl RowIter for OffsetIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        while self.remaining > 0 {
            self.remaining -= 1;
            if self.child.next()?.is_none() {
                return Ok(None);
            }
        }
        self.child.next()
    }

    fn close(&mut self) -> PlanResult<()> {
        self.child.close()
    }
}

pub struct DistinctIter {
    pub child: Box<dyn RowIter>,
    pub seen: HashSet<String>,
}

impl DistinctIter {
    pub fn new(child: Box<dyn RowIter>) -> Self {
        DistinctIter {
            child,
            seen: HashSet::new(),
        }
    }
}

impl RowIter for DistinctIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        while let Some(row) = self.child.next()? {
            let key = format!("{row:?}");
            if self.seen.insert(key) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> PlanResult<()> {
        self.child.close()
    }
}

pub struct UnionIter {
    pub left: Box<dyn RowIter>,
    pub right: Box<dyn RowIter>,
    pub left_done: bool,
}

impl RowIter for UnionIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        if !self.left_done {
            if let Some(row) = self.left.next()? {
                return Ok(Some(row));
            }
            self.left.close()?;
            self.left_done = true;
        }
        self.right.next()
    }

    fn close(&mut self) -> PlanResult<()> {
        if !self.left_done {
            self.left.close()?;
        }
        self.right.close()
    }
}

/// A plain nested-loop join: the right side is fully buffered (it has to
/// be, since it's rescanned once per left row) and matched against each
/// left row in turn. `Left`/`Right` emit a null-padded row when no match is
/// found; `Cross` and a missing condition always match.
pub struct JoinIter {
    kind: JoinKind,
    condition: Option<Expression>,
    left: Box<dyn RowIter>,
    left_width: usize,
    right_rows: Vec<Row>,
    right_width: usize,
    current_left: Option<Row>,
    right_index: usize,
    left_matched: bool,
    emitted_right_indices: HashSet<usize>,
    left_exhausted: bool,
    right_outer_index: usize,
}

impl JoinIter {
    pub fn new(
        kind: JoinKind,
        condition: Option<Expression>,
        left: Box<dyn RowIter>,
        mut right: Box<dyn RowIter>,
        left_width: usize,
        right_width: usize,
    ) -> PlanResult<Self> {
        let mut right_rows = Vec::new();
        while let Some(row) = right.next()? {
            right_rows.push(row);
        }
        right.close()?;
        Ok(JoinIter {
            kind,
            condition,
            left,
            left_width,
            right_rows,
            right_width,
            current_left: None,
            right_index: 0,
            left_matched: false,
            emitted_right_indices: HashSet::new(),
            left_exhausted: false,
            right_outer_index: 0,
        })
    }

    fn matches(&self, left: &Row, right: &Row) -> PlanResult<bool> {
        match &self.condition {
            None => Ok(true),
            Some(cond) => {
                let mut combined = left.clone();
                combined.extend(right.clone());
                Ok(matches!(cond.eval(&combined)?, Value::Bool(true)))
            }
        }
    }
}

impl RowIter for JoinIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        loop {
            if self.left_exhausted {
                if !matches!(self.kind, JoinKind::Right) {
                    return Ok(None);
                }
                while self.right_outer_index < self.right_rows.len() {
                    let idx = self.right_outer_index;
                    self.right_outer_index += 1;
                    if !self.emitted_right_indices.contains(&idx) {
                        let mut combined = vec![Value::Null; self.left_width];
                        combined.extend(self.right_rows[idx].clone());
                        return Ok(Some(combined));
                    }
                }
                return Ok(None);
            }
            if self.current_left.is_none() {
                match self.left.next()? {
                    Some(row) => {
                        self.current_left = Some(row);
                        self.right_index = 0;
                        self.left_matched = false;
                    }
                    None => {
                        self.left_exhausted = true;
                        continue;
                    }
                }
            }
            let left_row = self.current_left.as_ref().unwrap().clone();
            while self.right_index < self.right_rows.len() {
                let idx = self.right_index;
                self.right_index += 1;
                let right_row = &self.right_rows[idx];
                if self.matches(&left_row, right_row)? {
                    self.left_matched = true;
                    self.emitted_right_indices.insert(idx);
                    let mut combined = left_row.clone();
                    combined.extend(right_row.clone());
                    return Ok(Some(combined));
                }
            }
            // Exhausted the right side for this left row.
            let unmatched_left = !self.left_matched
                && matches!(self.kind, JoinKind::Left | JoinKind::Natural);
            self.current_left = None;
            if unmatched_left {
                let mut combined = left_row;
                combined.extend(std::iter::repeat(Value::Null).take(self.right_width));
                return Ok(Some(combined));
            }
        }
    }

    fn close(&mut self) -> PlanResult<()> {
        self.left.close()
    }
}

pub struct GenerateIter {
    pub column: Expression,
    pub child: Box<dyn RowIter>,
    pub pending: std::vec::IntoIter<Value>,
    pub pending_row: Row,
}

impl GenerateIter {
    pub fn new(column: Expression, child: Box<dyn RowIter>) -> Self {
        GenerateIter {
            column,
            child,
            pending: Vec::new().into_iter(),
            pending_row: Vec::new(),
        }
    }
}

impl RowIter for GenerateIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        loop {
            if let Some(value) = self.pending.next() {
                let mut row = self.pending_row.clone();
                row.push(value);
                return Ok(Some(row));
            }
            match self.child.next()? {
                Some(row) => {
                    let generated = self.column.eval(&row)?;
                    self.pending_row = row;
                    self.pending = match generated {
                        Value::Array(values) => values.into_iter(),
                        other => vec![other].into_iter(),
                    };
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self) -> PlanResult<()> {
        self.child.close()
    }
}

pub struct EmptyTableIter;

impl RowIter for EmptyTableIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        Ok(None)
    }
}

/// A single-row iterator, used by every `SHOW`/`DESCRIBE`-style node whose
/// whole result is computed up front.
pub struct SingleBatchIter {
    rows: std::vec::IntoIter<Row>,
}

impl SingleBatchIter {
    pub fn new(rows: Vec<Row>) -> Self {
        SingleBatchIter {
            rows: rows.into_iter(),
        }
    }
}

impl RowIter for SingleBatchIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

/// Wraps the root iterator of a statement: once it reports end of stream,
/// the process is marked done in the catalog's process list. `CREATE
/// INDEX` never gets this wrapper — its background build marks the
/// process done on its own schedule.
pub struct QueryProcessIter {
    pub child: Box<dyn RowIter>,
    pub catalog: Arc<dyn CatalogHandle>,
    pub pid: u64,
    pub finished: bool,
}

impl RowIter for QueryProcessIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        match self.child.next()? {
            Some(row) => Ok(Some(row)),
            None => {
                if !self.finished {
                    self.catalog.mark_process_done(self.pid);
                    self.finished = true;
                }
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> PlanResult<()> {
        if !self.finished {
            self.catalog.mark_process_done(self.pid);
            self.finished = true;
        }
        self.child.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedsql_core::DataType;

    struct VecIter(std::vec::IntoIter<Row>);

    impl RowIter for VecIter {
        fn next(&mut self) -> PlanResult<Option<Row>> {
            Ok(self.0.next())
        }
    }

    fn vec_iter(rows: Vec<Row>) -> Box<dyn RowIter> {
        Box::new(VecIter(rows.into_iter()))
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let child = vec_iter(vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        let mut iter = FilterIter {
            predicate: Expression::Function {
                name: "eq2".into(),
                args: vec![Expression::GetField {
                    index: 0,
                    name: "a".into(),
                    data_type: DataType::Int,
                    nullable: false,
                    source_table: "t".into(),
                }],
                data_type: DataType::Bool,
                nullable: false,
                eval: Arc::new(|args| Ok(Value::Bool(args[0] == Value::Int(2)))),
            },
            child,
        };
        assert_eq!(iter.next().unwrap(), Some(vec![Value::Int(2)]));
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn limit_and_offset_compose() {
        let child = vec_iter(vec![
            vec![Value::Int(1)],
            vec![Value::Int(2)],
            vec![Value::Int(3)],
        ]);
        let mut iter = LimitIter {
            remaining: 1,
            child: Box::new(OffsetIter { remaining: 1, child }),
        };
        assert_eq!(iter.next().unwrap(), Some(vec![Value::Int(2)]));
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn distinct_drops_duplicate_rows() {
        let child = vec_iter(vec![vec![Value::Int(1)], vec![Value::Int(1)], vec![Value::Int(2)]]);
        let mut iter = DistinctIter::new(child);
        assert_eq!(iter.next().unwrap(), Some(vec![Value::Int(1)]));
        assert_eq!(iter.next().unwrap(), Some(vec![Value::Int(2)]));
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn generate_explodes_array_values() {
        let child = vec_iter(vec![vec![Value::Array(vec![Value::Int(1), Value::Int(2)])]]);
        let mut iter = GenerateIter::new(
            Expression::GetField {
                index: 0,
                name: "tags".into(),
                data_type: DataType::Array(Box::new(DataType::Int)),
                nullable: false,
                source_table: "t".into(),
            },
            child,
        );
        assert_eq!(
            iter.next().unwrap(),
            Some(vec![Value::Array(vec![Value::Int(1), Value::Int(2)]), Value::Int(1)])
        );
        assert_eq!(
            iter.next().unwrap(),
            Some(vec![Value::Array(vec![Value::Int(1), Value::Int(2)]), Value::Int(2)])
        );
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn inner_join_matches_on_condition() {
        let left = vec_iter(vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        let right = vec_iter(vec![vec![Value::Int(2)], vec![Value::Int(3)]]);
        let condition = Expression::Function {
            name: "eq".into(),
            args: vec![
                Expression::GetField {
                    index: 0,
                    name: "a".into(),
                    data_type: DataType::Int,
                    nullable: false,
                    source_table: "l".into(),
                },
                Expression::GetField {
                    index: 1,
                    name: "b".into(),
                    data_type: DataType::Int,
                    nullable: false,
                    source_table: "r".into(),
                },
            ],
            data_type: DataType::Bool,
            nullable: false,
            eval: Arc::new(|args| Ok(Value::Bool(args[0] == args[1]))),
        };
        let mut iter = JoinIter::new(JoinKind::Inner, Some(condition), left, right, 1, 1).unwrap();
        assert_eq!(iter.next().unwrap(), Some(vec![Value::Int(2), Value::Int(2)]));
        assert_eq!(iter.next().unwrap(), None);
    }
}
