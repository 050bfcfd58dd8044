use csv::ReaderBuilder;
use log::debug;
use std::cmp::Ordering;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError};
use crate::command::{self, Command, CompareOp, Comparison, Operand, Projection};
use crate::config::DbConfig;
use crate::file::{BufferManager, DiskManager, FileError};
use crate::record::{ColumnInfo, ColumnKind, Record, RecordError, Relation};


#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Parse(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("unknown alias: {0} (expected {1})")]
    UnknownAlias(String, String),

    #[error("invalid numeric value {0:?}")]
    BadNumber(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("file error: {0}")]
    File(#[from] FileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A comparison operand resolved against a schema.
enum Term {
    Column(usize),
    Constant(String),
}

/// A WHERE comparison compiled against a schema: operands resolved,
/// constants validated, and the comparison typed by the referenced
/// column (text ordering when neither side is a column).
struct CompiledCmp {
    left: Term,
    op: CompareOp,
    right: Term,
    kind: ColumnKind,
}

impl CompiledCmp {
    fn matches(&self, rec: &Record) -> bool {
        let left = term_value(&self.left, rec);
        let right = term_value(&self.right, rec);
        match self.kind {
            ColumnKind::Int => match (left.parse::<i32>(), right.parse::<i32>()) {
                (Ok(l), Ok(r)) => ord_matches(self.op, l.cmp(&r)),
                _ => false,
            },
            ColumnKind::Float => match (left.parse::<f32>(), right.parse::<f32>()) {
                (Ok(l), Ok(r)) => match self.op {
                    CompareOp::Eq => l == r,
                    CompareOp::Ne => l != r,
                    CompareOp::Lt => l < r,
                    CompareOp::Gt => l > r,
                    CompareOp::Le => l <= r,
                    CompareOp::Ge => l >= r,
                },
                _ => false,
            },
            ColumnKind::Char(_) | ColumnKind::Varchar(_) => ord_matches(self.op, left.cmp(right)),
        }
    }
}

fn term_value<'r>(term: &'r Term, rec: &'r Record) -> &'r str {
    match term {
        Term::Column(idx) => rec.get(*idx).unwrap_or(""),
        Term::Constant(value) => value,
    }
}

fn ord_matches(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

fn resolve_operand(operand: &Operand, rel: &Relation, alias: &str) -> EngineResult<Term> {
    match operand {
        Operand::Column { alias: a, name } => {
            if a != alias {
                return Err(EngineError::UnknownAlias(a.clone(), alias.to_string()));
            }
            let idx = rel
                .column_index(name)
                .ok_or_else(|| EngineError::UnknownColumn(name.clone()))?;
            Ok(Term::Column(idx))
        }
        Operand::Literal(value) => Ok(Term::Constant(value.clone())),
    }
}

/// Resolve operands and pick the comparison type from the first
/// column operand; validate numeric constants up front so scans
/// never hit a bad literal mid-walk.
fn compile_predicate(
    predicate: &[Comparison],
    rel: &Relation,
    alias: &str,
) -> EngineResult<Vec<CompiledCmp>> {
    let mut out = Vec::with_capacity(predicate.len());
    for cmp in predicate {
        let left = resolve_operand(&cmp.left, rel, alias)?;
        let right = resolve_operand(&cmp.right, rel, alias)?;
        let kind = match (&left, &right) {
            (Term::Column(idx), _) => rel.columns()[*idx].kind,
            (_, Term::Column(idx)) => rel.columns()[*idx].kind,
            _ => ColumnKind::Varchar(0),
        };
        for term in [&left, &right] {
            if let Term::Constant(value) = term {
                let ok = match kind {
                    ColumnKind::Int => value.parse::<i32>().is_ok(),
                    ColumnKind::Float => value.parse::<f32>().is_ok(),
                    _ => true,
                };
                if !ok {
                    return Err(EngineError::BadNumber(value.clone()));
                }
            }
        }
        out.push(CompiledCmp {
            left,
            op: cmp.op,
            right,
            kind,
        });
    }
    Ok(out)
}

fn matches_all(rec: &Record, predicate: &[CompiledCmp]) -> bool {
    predicate.iter().all(|cmp| cmp.matches(rec))
}

/// Owns the wired core (disk manager, buffer pool, catalog) and
/// executes parsed commands against it.
pub struct Engine {
    dm: Arc<DiskManager>,
    bm: Arc<BufferManager>,
    catalog: Catalog,
}

impl Engine {
    /// Initialise the storage layers and load any saved catalog.
    pub fn new(cfg: DbConfig) -> EngineResult<Self> {
        let dm = Arc::new(DiskManager::new(&cfg));
        dm.init()?;
        let bm = Arc::new(BufferManager::new(&cfg, dm.clone()));
        let mut catalog = Catalog::new(cfg, dm.clone(), bm.clone());
        catalog.load_state()?;
        Ok(Self { dm, bm, catalog })
    }

    /// Parse and execute one command line, writing results to `out`.
    /// Returns `false` when the command was EXIT (state persisted).
    pub fn process_command(&mut self, line: &str, out: &mut impl Write) -> EngineResult<bool> {
        let cmd = command::parse(line).map_err(EngineError::Parse)?;
        debug!("executing {cmd:?}");
        match cmd {
            Command::CreateTable { name, columns } => self.exec_create(name, columns, out)?,
            Command::Insert { table, values } => self.exec_insert(&table, values, out)?,
            Command::Append { table, path } => self.exec_append(&table, &path, out)?,
            Command::Select {
                projection,
                table,
                alias,
                predicate,
            } => self.exec_select(&projection, &table, &alias, &predicate, out)?,
            Command::Delete {
                table,
                alias,
                predicate,
            } => self.exec_delete(&table, &alias, &predicate, out)?,
            Command::Update {
                table,
                alias,
                assignments,
                predicate,
            } => self.exec_update(&table, &alias, &assignments, &predicate, out)?,
            Command::DropTable(name) => {
                self.catalog.remove_table(&name)?;
                writeln!(out, "OK")?;
            }
            Command::DropAllTables => {
                self.catalog.remove_all_tables()?;
                writeln!(out, "OK")?;
            }
            Command::DescribeTable(name) => {
                let line = self.catalog.describe(&name)?;
                writeln!(out, "{line}")?;
            }
            Command::DescribeAllTables => {
                for line in self.catalog.describe_all() {
                    writeln!(out, "{line}")?;
                }
            }
            Command::Exit => {
                self.shutdown()?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Persist the catalog, flush the pool and the allocation state.
    pub fn shutdown(&mut self) -> EngineResult<()> {
        self.catalog.save_state()?;
        self.bm.flush_all()?;
        self.dm.finish()?;
        Ok(())
    }

    fn exec_create(
        &mut self,
        name: String,
        columns: Vec<(String, ColumnKind)>,
        out: &mut impl Write,
    ) -> EngineResult<()> {
        let cols = columns
            .into_iter()
            .map(|(name, kind)| ColumnInfo::new(name, kind))
            .collect();
        self.catalog.add_table(Relation::new(name, cols))?;
        writeln!(out, "OK")?;
        Ok(())
    }

    fn exec_insert(
        &mut self,
        table: &str,
        values: Vec<String>,
        out: &mut impl Write,
    ) -> EngineResult<()> {
        let rec = Record::new(values);
        self.catalog.table_mut(table)?.insert_record(&rec)?;
        self.bm.flush_all()?;
        writeln!(out, "OK")?;
        Ok(())
    }

    fn exec_append(&mut self, table: &str, path: &str, out: &mut impl Write) -> EngineResult<()> {
        let heap = self.catalog.table_mut(table)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut inserted = 0usize;
        for row in reader.records() {
            let row = row?;
            if row.iter().all(|field| field.is_empty()) {
                continue;
            }
            let rec = Record::new(row.iter().map(String::from).collect());
            heap.insert_record(&rec)?;
            inserted += 1;
        }
        self.bm.flush_all()?;
        writeln!(out, "OK ({inserted} inserted)")?;
        Ok(())
    }

    fn exec_select(
        &mut self,
        projection: &Projection,
        table: &str,
        alias: &str,
        predicate: &[Comparison],
        out: &mut impl Write,
    ) -> EngineResult<()> {
        // scans observe every prior mutation: flush before reading
        self.bm.flush_all()?;
        let heap = self.catalog.table(table)?;
        let rel = heap.relation();

        let proj: Vec<usize> = match projection {
            Projection::All => (0..rel.columns().len()).collect(),
            Projection::Columns(cols) => {
                let mut idxs = Vec::with_capacity(cols.len());
                for (a, name) in cols {
                    if a != alias {
                        return Err(EngineError::UnknownAlias(a.clone(), alias.to_string()));
                    }
                    idxs.push(
                        rel.column_index(name)
                            .ok_or_else(|| EngineError::UnknownColumn(name.clone()))?,
                    );
                }
                idxs
            }
        };
        let compiled = compile_predicate(predicate, rel, alias)?;

        let mut total = 0usize;
        heap.scan_records(|rec, _| {
            if matches_all(&rec, &compiled) {
                let fields: Vec<&str> = proj.iter().map(|&i| rec.get(i).unwrap_or("")).collect();
                writeln!(out, "{}", fields.join(" ; ")).map_err(RecordError::from)?;
                total += 1;
            }
            Ok(())
        })?;
        writeln!(out, "Total selected records = {total}")?;
        Ok(())
    }

    fn exec_delete(
        &mut self,
        table: &str,
        alias: &str,
        predicate: &[Comparison],
        out: &mut impl Write,
    ) -> EngineResult<()> {
        let heap = self.catalog.table_mut(table)?;
        let compiled = compile_predicate(predicate, heap.relation(), alias)?;

        let mut to_delete = Vec::new();
        heap.scan_records(|rec, rid| {
            if matches_all(&rec, &compiled) {
                to_delete.push(rid);
            }
            Ok(())
        })?;
        let deleted = to_delete.len();
        for rid in to_delete {
            heap.delete_record(rid)?;
        }
        self.bm.flush_all()?;
        writeln!(out, "Total deleted records = {deleted}")?;
        Ok(())
    }

    fn exec_update(
        &mut self,
        table: &str,
        alias: &str,
        assignments: &[((String, String), String)],
        predicate: &[Comparison],
        out: &mut impl Write,
    ) -> EngineResult<()> {
        let heap = self.catalog.table_mut(table)?;
        let rel = heap.relation();

        let mut changes = Vec::with_capacity(assignments.len());
        for ((a, name), value) in assignments {
            if a != alias {
                return Err(EngineError::UnknownAlias(a.clone(), alias.to_string()));
            }
            let idx = rel
                .column_index(name)
                .ok_or_else(|| EngineError::UnknownColumn(name.clone()))?;
            changes.push((idx, value.clone()));
        }
        let compiled = compile_predicate(predicate, rel, alias)?;

        // collect first, then apply as delete + insert; the old
        // RecordIds do not survive an update
        let mut todo = Vec::new();
        heap.scan_records(|rec, rid| {
            if matches_all(&rec, &compiled) {
                let mut values: Vec<String> = rec.values().to_vec();
                for (idx, value) in &changes {
                    values[*idx] = value.clone();
                }
                todo.push((rid, Record::new(values)));
            }
            Ok(())
        })?;
        let updated = todo.len();
        for (rid, rec) in todo {
            heap.delete_record(rid)?;
            heap.insert_record(&rec)?;
        }
        self.bm.flush_all()?;
        writeln!(out, "Total updated records = {updated}")?;
        Ok(())
    }
}
