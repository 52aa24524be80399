use super::ast::{Ast, Attribute, Stmt, StmtKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonAttribute {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonStmtKind {
    Attribute(JsonAttribute),
    VarAssign { name: String, value: String },
    IndexAssign { name: String, index: String, value: String },
    Label { name: String },
    LabelAlias { name: String, targets: Vec<String> },
    Command { raw: String },
    If { condition: String },
    Else,
    Endif,
    Goto { target: String },
    Call { target: String },
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonStmt {
    pub line: usize,
    pub indent: usize,
    #[serde(flatten)]
    pub kind: JsonStmtKind,
}

impl From<&Attribute> for JsonAttribute {
    fn from(attr: &Attribute) -> Self {
        JsonAttribute {
            name: attr.name.clone(),
            params: attr.params.clone(),
        }
    }
}

impl From<&StmtKind> for JsonStmtKind {
    fn from(kind: &StmtKind) -> Self {
        match kind {
            StmtKind::Attribute(attr) => JsonStmtKind::Attribute(attr.into()),
            StmtKind::VarAssign { name, value } => JsonStmtKind::VarAssign {
                name: name.clone(),
                value: value.clone(),
            },
            StmtKind::IndexAssign { name, index, value } => JsonStmtKind::IndexAssign {
                name: name.clone(),
                index: index.clone(),
                value: value.clone(),
            },
            StmtKind::Label { name } => JsonStmtKind::Label { name: name.clone() },
            StmtKind::LabelAlias { name, targets } => JsonStmtKind::LabelAlias {
                name: name.clone(),
                targets: targets.clone(),
            },
            StmtKind::Command { raw } => JsonStmtKind::Command { raw: raw.clone() },
            StmtKind::If { condition } => JsonStmtKind::If {
                condition: condition.clone(),
            },
            StmtKind::Else => JsonStmtKind::Else,
            StmtKind::Endif => JsonStmtKind::Endif,
            StmtKind::Goto { target } => JsonStmtKind::Goto {
                target: target.clone(),
            },
            StmtKind::Call { target } => JsonStmtKind::Call {
                target: target.clone(),
            },
        }
    }
}

impl From<&Stmt> for JsonStmt {
    fn from(stmt: &Stmt) -> Self {
        JsonStmt {
            line: stmt.line,
            indent: stmt.indent,
            kind: (&stmt.kind).into(),
        }
    }
}

pub fn to_json(ast: &Ast) -> Result<String, serde_json::Error> {
    let json_stmts: Vec<JsonStmt> = ast.stmts.iter().map(|s| s.into()).collect();
    serde_json::to_string_pretty(&json_stmts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mewoparse::parser::parse_source;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[test]
    fn test_to_json_shape() {
        let ast = parse_source("#linux\nbuild:\n    #cwd(out) make all\n").unwrap();
        let text = to_json(&ast).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(
            value,
            json!([
                {"line": 1, "indent": 0, "type": "attribute", "name": "linux", "params": []},
                {"line": 2, "indent": 0, "type": "label", "name": "build"},
                {"line": 3, "indent": 1, "type": "attribute", "name": "cwd", "params": ["out"]},
                {"line": 3, "indent": 1, "type": "command", "raw": "make all"},
            ])
        );
    }

    #[test]
    fn test_markers_have_no_fields() {
        let ast = parse_source("#if(true)\n    echo a\n#else\n#endif\n").unwrap();
        let stmts: Vec<JsonStmt> = serde_json::from_str(&to_json(&ast).unwrap()).unwrap();
        assert_eq!(stmts[2].kind, JsonStmtKind::Else);
        assert_eq!(stmts[3].kind, JsonStmtKind::Endif);
    }
}
