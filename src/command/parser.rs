use chumsky::{prelude::*, text::ascii::ident};

use super::{Command, CompareOp, Comparison, Operand, Projection};
use crate::record::ColumnKind;

/// Character-level grammar for the command surface. Keywords are
/// upper-case; identifiers are ASCII; string literals take single or
/// double quotes; numeric literals keep their exact spelling.
pub fn command<'a>() -> impl Parser<'a, &'a str, Command, extra::Err<Rich<'a, char>>> {
    let number = just('-')
        .or_not()
        .then(one_of("0123456789").repeated().at_least(1))
        .then(just('.').then(one_of("0123456789").repeated()).or_not())
        .to_slice()
        .map(|s: &str| s.to_string())
        .boxed();

    let quoted = choice((
        just('\'')
            .ignore_then(none_of("'").repeated().to_slice())
            .then_ignore(just('\'')),
        just('"')
            .ignore_then(none_of("\"").repeated().to_slice())
            .then_ignore(just('"')),
    ))
    .map(|s: &str| s.to_string())
    .boxed();

    let value = choice((
        number.clone(),
        quoted.clone(),
        ident().map(|s: &str| s.to_string()),
    ))
    .padded()
    .boxed();

    let name = ident().map(|s: &str| s.to_string()).padded().boxed();

    let qualified = ident()
        .then(just('.').ignore_then(ident()))
        .map(|(alias, column): (&str, &str)| (alias.to_string(), column.to_string()))
        .padded()
        .boxed();

    let size = one_of("0123456789")
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.parse::<usize>().unwrap_or(0))
        .padded()
        .boxed();

    let col_type = choice((
        just("INT").to(ColumnKind::Int),
        just("FLOAT").to(ColumnKind::Float),
        // REAL is an input-only alias
        just("REAL").to(ColumnKind::Float),
        just("VARCHAR")
            .ignore_then(size.clone().delimited_by(just('('), just(')')))
            .map(ColumnKind::Varchar),
        just("CHAR")
            .ignore_then(size.clone().delimited_by(just('('), just(')')))
            .map(ColumnKind::Char),
    ))
    .padded()
    .boxed();

    let col_def = ident()
        .map(|s: &str| s.to_string())
        .padded()
        .then_ignore(just(':').padded())
        .then(col_type)
        .boxed();

    let create = just("CREATE")
        .padded()
        .ignore_then(just("TABLE").padded())
        .ignore_then(name.clone())
        .then(
            col_def
                .separated_by(just(',').padded())
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just('(').padded(), just(')').padded()),
        )
        .map(|(table, columns)| Command::CreateTable {
            name: table,
            columns,
        });

    let insert = just("INSERT")
        .padded()
        .ignore_then(just("INTO").padded())
        .ignore_then(name.clone())
        .then_ignore(just("VALUES").padded())
        .then(
            value
                .clone()
                .separated_by(just(',').padded())
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just('(').padded(), just(')').padded()),
        )
        .map(|(table, values)| Command::Insert { table, values });

    // everything between the parentheses is the file path
    let path = none_of(")")
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.trim().to_string());

    let append = just("APPEND")
        .padded()
        .ignore_then(just("INTO").padded())
        .ignore_then(name.clone())
        .then_ignore(just("ALLRECORDS").padded())
        .then(path.delimited_by(just('('), just(')')))
        .map(|(table, path)| Command::Append { table, path });

    let operand = choice((
        qualified.clone().map(|(alias, column)| Operand::Column {
            alias,
            name: column,
        }),
        number.clone().map(Operand::Literal),
        quoted.clone().map(Operand::Literal),
        ident().map(|s: &str| Operand::Literal(s.to_string())),
    ))
    .padded()
    .boxed();

    let op = choice((
        just("<=").to(CompareOp::Le),
        just(">=").to(CompareOp::Ge),
        just("<>").to(CompareOp::Ne),
        just("=").to(CompareOp::Eq),
        just("<").to(CompareOp::Lt),
        just(">").to(CompareOp::Gt),
    ))
    .padded()
    .boxed();

    let comparison = operand
        .clone()
        .then(op)
        .then(operand)
        .map(|((left, op), right)| Comparison { left, op, right })
        .boxed();

    let where_clause = just("WHERE")
        .padded()
        .ignore_then(
            comparison
                .separated_by(just("AND").padded())
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .or_not()
        .map(|predicate| predicate.unwrap_or_default())
        .boxed();

    let projection = choice((
        just('*').padded().to(Projection::All),
        qualified
            .clone()
            .separated_by(just(',').padded())
            .at_least(1)
            .collect::<Vec<_>>()
            .map(Projection::Columns),
    ))
    .boxed();

    let select = just("SELECT")
        .padded()
        .ignore_then(projection)
        .then_ignore(just("FROM").padded())
        .then(name.clone())
        .then(name.clone())
        .then(where_clause.clone())
        .map(|(((projection, table), alias), predicate)| Command::Select {
            projection,
            table,
            alias,
            predicate,
        });

    let delete = just("DELETE")
        .padded()
        .ignore_then(name.clone())
        .then(name.clone())
        .then(where_clause.clone())
        .map(|((table, alias), predicate)| Command::Delete {
            table,
            alias,
            predicate,
        });

    let assignment = qualified
        .clone()
        .then_ignore(just('=').padded())
        .then(value.clone())
        .boxed();

    let update = just("UPDATE")
        .padded()
        .ignore_then(name.clone())
        .then(name.clone())
        .then_ignore(just("SET").padded())
        .then(
            assignment
                .separated_by(just(',').padded())
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .then(where_clause.clone())
        .map(|(((table, alias), assignments), predicate)| Command::Update {
            table,
            alias,
            assignments,
            predicate,
        });

    let drop_all = just("DROP")
        .padded()
        .then(just("TABLES").padded())
        .to(Command::DropAllTables);

    let drop_one = just("DROP")
        .padded()
        .ignore_then(just("TABLE").padded())
        .ignore_then(name.clone())
        .map(Command::DropTable);

    let describe_all = just("DESCRIBE")
        .padded()
        .then(just("TABLES").padded())
        .to(Command::DescribeAllTables);

    let describe_one = just("DESCRIBE")
        .padded()
        .ignore_then(just("TABLE").padded())
        .ignore_then(name.clone())
        .map(Command::DescribeTable);

    let exit = just("EXIT").padded().to(Command::Exit);

    choice((
        create,
        insert,
        append,
        select,
        delete,
        update,
        drop_all,
        drop_one,
        describe_all,
        describe_one,
        exit,
    ))
    .then_ignore(end())
}
