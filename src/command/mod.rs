mod parser;

use chumsky::Parser;

use crate::record::ColumnKind;

/// One comparison operand: an alias-qualified column or a literal
/// kept in its textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column { alias: String, name: String },
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Operand,
    pub op: CompareOp,
    pub right: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    /// (alias, column) pairs, in projection order.
    Columns(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTable {
        name: String,
        columns: Vec<(String, ColumnKind)>,
    },
    Insert {
        table: String,
        values: Vec<String>,
    },
    Append {
        table: String,
        path: String,
    },
    Select {
        projection: Projection,
        table: String,
        alias: String,
        predicate: Vec<Comparison>,
    },
    Delete {
        table: String,
        alias: String,
        predicate: Vec<Comparison>,
    },
    Update {
        table: String,
        alias: String,
        assignments: Vec<((String, String), String)>,
        predicate: Vec<Comparison>,
    },
    DropTable(String),
    DropAllTables,
    DescribeTable(String),
    DescribeAllTables,
    Exit,
}

/// Parse one command line.
pub fn parse(input: &str) -> Result<Command, String> {
    parser::command()
        .parse(input)
        .into_result()
        .map_err(|errs| format!("syntax error: {:?}", errs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table() {
        let cmd = parse("CREATE TABLE Fruit (id:INT,name:VARCHAR(20),price:REAL)").unwrap();
        assert_eq!(
            cmd,
            Command::CreateTable {
                name: "Fruit".into(),
                columns: vec![
                    ("id".into(), ColumnKind::Int),
                    ("name".into(), ColumnKind::Varchar(20)),
                    ("price".into(), ColumnKind::Float),
                ],
            }
        );
    }

    #[test]
    fn test_create_table_char_and_float() {
        let cmd = parse("CREATE TABLE T (a:CHAR(4), b:FLOAT)").unwrap();
        assert_eq!(
            cmd,
            Command::CreateTable {
                name: "T".into(),
                columns: vec![
                    ("a".into(), ColumnKind::Char(4)),
                    ("b".into(), ColumnKind::Float),
                ],
            }
        );
    }

    #[test]
    fn test_insert() {
        let cmd = parse("INSERT INTO Fruit VALUES (1,'Pomme',1.2)").unwrap();
        assert_eq!(
            cmd,
            Command::Insert {
                table: "Fruit".into(),
                values: vec!["1".into(), "Pomme".into(), "1.2".into()],
            }
        );
    }

    #[test]
    fn test_insert_negative_and_bare_values() {
        let cmd = parse("INSERT INTO T VALUES (-5, abc, \"quoted\")").unwrap();
        assert_eq!(
            cmd,
            Command::Insert {
                table: "T".into(),
                values: vec!["-5".into(), "abc".into(), "quoted".into()],
            }
        );
    }

    #[test]
    fn test_append() {
        let cmd = parse("APPEND INTO Fruit ALLRECORDS(data/fruits.csv)").unwrap();
        assert_eq!(
            cmd,
            Command::Append {
                table: "Fruit".into(),
                path: "data/fruits.csv".into(),
            }
        );
    }

    #[test]
    fn test_select_star() {
        let cmd = parse("SELECT * FROM Fruit f").unwrap();
        assert_eq!(
            cmd,
            Command::Select {
                projection: Projection::All,
                table: "Fruit".into(),
                alias: "f".into(),
                predicate: vec![],
            }
        );
    }

    #[test]
    fn test_select_projection_and_where() {
        let cmd = parse("SELECT f.id, f.name FROM Fruit f WHERE f.id > 1 AND f.name <> 'Poire'")
            .unwrap();
        assert_eq!(
            cmd,
            Command::Select {
                projection: Projection::Columns(vec![
                    ("f".into(), "id".into()),
                    ("f".into(), "name".into()),
                ]),
                table: "Fruit".into(),
                alias: "f".into(),
                predicate: vec![
                    Comparison {
                        left: Operand::Column {
                            alias: "f".into(),
                            name: "id".into()
                        },
                        op: CompareOp::Gt,
                        right: Operand::Literal("1".into()),
                    },
                    Comparison {
                        left: Operand::Column {
                            alias: "f".into(),
                            name: "name".into()
                        },
                        op: CompareOp::Ne,
                        right: Operand::Literal("Poire".into()),
                    },
                ],
            }
        );
    }

    #[test]
    fn test_select_all_operators() {
        for (text, op) in [
            ("=", CompareOp::Eq),
            ("<>", CompareOp::Ne),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
        ] {
            let cmd = parse(&format!("SELECT * FROM T t WHERE t.x {} 3", text)).unwrap();
            match cmd {
                Command::Select { predicate, .. } => assert_eq!(predicate[0].op, op),
                other => panic!("unexpected command {:?}", other),
            }
        }
    }

    #[test]
    fn test_delete() {
        let cmd = parse("DELETE Fruit f WHERE f.id = 2").unwrap();
        assert_eq!(
            cmd,
            Command::Delete {
                table: "Fruit".into(),
                alias: "f".into(),
                predicate: vec![Comparison {
                    left: Operand::Column {
                        alias: "f".into(),
                        name: "id".into()
                    },
                    op: CompareOp::Eq,
                    right: Operand::Literal("2".into()),
                }],
            }
        );
    }

    #[test]
    fn test_delete_without_where() {
        let cmd = parse("DELETE Fruit f").unwrap();
        assert_eq!(
            cmd,
            Command::Delete {
                table: "Fruit".into(),
                alias: "f".into(),
                predicate: vec![],
            }
        );
    }

    #[test]
    fn test_update() {
        let cmd = parse("UPDATE Fruit f SET f.price = 0.6 WHERE f.name = 'Banane'").unwrap();
        assert_eq!(
            cmd,
            Command::Update {
                table: "Fruit".into(),
                alias: "f".into(),
                assignments: vec![(("f".into(), "price".into()), "0.6".into())],
                predicate: vec![Comparison {
                    left: Operand::Column {
                        alias: "f".into(),
                        name: "name".into()
                    },
                    op: CompareOp::Eq,
                    right: Operand::Literal("Banane".into()),
                }],
            }
        );
    }

    #[test]
    fn test_drop_and_describe() {
        assert_eq!(parse("DROP TABLE Fruit").unwrap(), Command::DropTable("Fruit".into()));
        assert_eq!(parse("DROP TABLES").unwrap(), Command::DropAllTables);
        assert_eq!(
            parse("DESCRIBE TABLE Fruit").unwrap(),
            Command::DescribeTable("Fruit".into())
        );
        assert_eq!(parse("DESCRIBE TABLES").unwrap(), Command::DescribeAllTables);
        assert_eq!(parse("EXIT").unwrap(), Command::Exit);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("CREATE TABLE").is_err());
        assert!(parse("INSERT Fruit VALUES (1)").is_err());
        assert!(parse("SELECT FROM Fruit f").is_err());
        assert!(parse("FLY ME TO THE MOON").is_err());
        assert!(parse("").is_err());
    }
}
