//! Human-readable statement listings for `--debug`.

use super::ast::{Ast, Stmt, StmtKind};
use std::collections::HashSet;
use std::fmt::Write;

/// One statement as `line │ indented text`.
pub fn format_stmt(stmt: &Stmt) -> String {
    format!("{:>4} │ {}{}", stmt.line, "    ".repeat(stmt.indent), stmt)
}

/// Lists every statement in the file.
pub fn render_ast(ast: &Ast) -> String {
    let mut output = String::new();
    for stmt in &ast.stmts {
        let _ = writeln!(output, "{}", format_stmt(stmt));
    }
    output
}

/// Lists a label's block followed by the blocks of the labels it reaches
/// through `call`, `goto`, alias targets and bare label-name commands.
/// Each label is listed once. Returns `None` if `name` is not declared.
pub fn render_label(ast: &Ast, name: &str) -> Option<String> {
    find_label(ast, name)?;

    let mut output = String::new();
    let mut seen = HashSet::new();
    let mut queue = vec![name.to_string()];

    while let Some(current) = queue.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        let index = match find_label(ast, &current) {
            Some(index) => index,
            None => continue,
        };

        let end = ast.block_end(index);
        let mut reached = Vec::new();
        for stmt in &ast.stmts[index..end] {
            let _ = writeln!(output, "{}", format_stmt(stmt));
            match &stmt.kind {
                StmtKind::LabelAlias { targets, .. } => reached.extend(targets.iter().cloned()),
                StmtKind::Call { target } | StmtKind::Goto { target } => reached.push(target.clone()),
                StmtKind::Command { raw } if find_label(ast, raw.trim()).is_some() => {
                    reached.push(raw.trim().to_string())
                }
                _ => {}
            }
        }
        output.push('\n');

        // Reversed so labels are listed in the order they are reached.
        queue.extend(reached.into_iter().rev());
    }

    Some(output)
}

fn find_label(ast: &Ast, name: &str) -> Option<usize> {
    ast.top_level_labels()
        .find(|(_, stmt)| stmt.label_name() == Some(name))
        .map(|(index, _)| index)
}

pub fn print_ast(ast: &Ast) {
    print!("{}", render_ast(ast));
}

/// Prints a label listing. Returns false if the label does not exist.
pub fn print_label(ast: &Ast, name: &str) -> bool {
    match render_label(ast, name) {
        Some(listing) => {
            print!("{}", listing);
            true
        }
        None => false,
    }
}
