//! In-memory stand-ins for mdbtools and PostgreSQL.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mdb_import::sql::{tokenize, Token};
use mdb_import::{
    ConnectParams, Connector, ExtractError, Extractor, ServerConfig, SqlError, SqlSession,
};

pub const ADMIN_PASSWORD: &str = "admin-secret";

pub const CUSTOMERS_SCHEMA: &str = r#"-- ----------------------------------------------------------
-- MDB Tools - A library for reading MS Access database files
-- ----------------------------------------------------------

CREATE TABLE "Customers"
 (
	"ID"			SERIAL NOT NULL,
	"Name"			VARCHAR (100)
);

CREATE UNIQUE INDEX "Customers_ID_idx" ON "Customers" ("ID");
ALTER TABLE "Customers" ADD CONSTRAINT "Customers_pkey" PRIMARY KEY ("ID");
"#;

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub name: String,
    pub columns: Vec<String>,
    pub inserts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeExtractor {
    pub tables: Vec<FakeTable>,
    pub schema: String,
    /// Behave as if the tool binaries are not installed.
    pub missing: bool,
    /// Panic inside `list_tables`.
    pub panics: bool,
}

impl FakeExtractor {
    /// One `Customers` table with columns `ID`, `Name` and one row.
    pub fn customers() -> Self {
        Self {
            tables: vec![FakeTable {
                name: "Customers".into(),
                columns: vec!["ID".into(), "Name".into()],
                inserts: vec![r#"INSERT INTO "Customers" ("ID", "Name") VALUES (1,'Ada Lovelace');"#.into()],
            }],
            schema: CUSTOMERS_SCHEMA.into(),
            ..Default::default()
        }
    }

    pub fn with_rows(mut self, table: &str, inserts: &[&str]) -> Self {
        if let Some(t) = self.tables.iter_mut().find(|t| t.name == table) {
            t.inserts = inserts.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    fn check(&self, tool: &str) -> Result<(), ExtractError> {
        if self.missing {
            return Err(ExtractError::ToolUnavailable {
                tool: tool.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Option<&FakeTable> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn list_tables(&self, _source: &Path) -> Result<Vec<String>, ExtractError> {
        self.check("mdb-tables")?;
        if self.panics {
            panic!("mdb-tables output was garbage");
        }
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn table_columns(&self, _source: &Path, table: &str) -> Result<Vec<String>, ExtractError> {
        self.check("mdb-export")?;
        Ok(self.table(table).map(|t| t.columns.clone()).unwrap_or_default())
    }

    async fn schema_dump(&self, _source: &Path) -> Result<String, ExtractError> {
        self.check("mdb-schema")?;
        Ok(self.schema.clone())
    }

    async fn export_rows(&self, _source: &Path, table: &str) -> Result<String, ExtractError> {
        self.check("mdb-export")?;
        let mut out = String::new();
        for insert in self.table(table).map(|t| t.inserts.as_slice()).unwrap_or_default() {
            out.push_str(insert);
            out.push('\n');
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct Database {
    pub owner: String,
    pub tables: BTreeMap<String, Table>,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub databases: BTreeMap<String, Database>,
    /// Role name → password.
    pub roles: BTreeMap<String, String>,
    pub grants: Vec<(String, String)>,
    /// `(user, sql)` for every statement received.
    pub executed: Vec<(String, String)>,
    pub connections: usize,
    /// Statements starting with a prefix fail with the paired error.
    pub failures: Vec<(String, SqlError)>,
    /// The connection drops when this many inserts have been received.
    pub drop_after_inserts: Option<usize>,
    inserts: usize,
}

/// A PostgreSQL look-alike understanding just the statements the
/// pipeline sends.
#[derive(Debug, Clone)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        let mut state = ServerState::default();
        state.databases.insert(
            "postgres".into(),
            Database {
                owner: "postgres".into(),
                ..Default::default()
            },
        );
        state.roles.insert("postgres".into(), ADMIN_PASSWORD.into());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn fail_on(&self, prefix: &str, err: SqlError) {
        self.state().failures.push((prefix.to_string(), err));
    }

    pub fn table(&self, database: &str, table: &str) -> Option<Table> {
        self.state()
            .databases
            .get(database)
            .and_then(|db| db.tables.get(table))
            .cloned()
    }

    pub fn database_names(&self) -> Vec<String> {
        self.state().databases.keys().cloned().collect()
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            state: Arc::clone(&self.state),
        }
    }
}

pub struct FakeConnector {
    state: Arc<Mutex<ServerState>>,
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, params: &ConnectParams) -> Result<FakeSession, SqlError> {
        let mut state = self.state.lock().unwrap();
        match state.roles.get(&params.user) {
            Some(password) if Some(password) == params.password.as_ref() => {}
            _ => {
                return Err(SqlError::from_sqlstate(
                    "28P01",
                    format!("password authentication failed for user \"{}\"", params.user),
                ))
            }
        }
        if !state.databases.contains_key(&params.database) {
            return Err(SqlError::from_sqlstate(
                "3D000",
                format!("database \"{}\" does not exist", params.database),
            ));
        }
        state.connections += 1;
        Ok(FakeSession {
            state: Arc::clone(&self.state),
            user: params.user.clone(),
            database: params.database.clone(),
            closed: false,
        })
    }
}

pub struct FakeSession {
    state: Arc<Mutex<ServerState>>,
    user: String,
    database: String,
    closed: bool,
}

#[async_trait]
impl SqlSession for FakeSession {
    async fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        if self.closed {
            return Err(SqlError::Connection("session is closed".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.executed.push((self.user.clone(), sql.to_string()));
        if let Some((_, err)) = state.failures.iter().find(|(p, _)| sql.starts_with(p.as_str())) {
            let err = err.clone();
            if err.is_fatal() {
                self.closed = true;
            }
            return Err(err);
        }
        let result = apply(&mut state, &self.database, sql);
        if let Err(err) = &result {
            if err.is_fatal() {
                self.closed = true;
            }
        }
        result
    }

    async fn close(&mut self) -> Result<(), SqlError> {
        self.closed = true;
        Ok(())
    }
}

fn err(code: &str, message: impl Into<String>) -> SqlError {
    SqlError::from_sqlstate(code, message)
}

/// Unquoted name of an identifier token; bare words fold to lowercase.
fn name(tok: Option<&Token<'_>>) -> Result<String, SqlError> {
    match tok.copied() {
        Some(Token::Word(w)) => Ok(w.to_lowercase()),
        Some(quoted @ Token::QuotedIdent(_)) => {
            Ok(quoted.identifier().unwrap_or_default().into_owned())
        }
        other => Err(err("42601", format!("syntax error at or near {:?}", other.map(|t| t.text())))),
    }
}

fn literal(tok: Option<&Token<'_>>) -> Result<String, SqlError> {
    match tok.copied() {
        Some(Token::Literal(l)) => Ok(l[1..l.len() - 1].replace("''", "'")),
        other => Err(err("42601", format!("expected literal, got {:?}", other.map(|t| t.text())))),
    }
}

/// Split `tokens[start..]` (which must begin with `(`) into comma-separated
/// groups at depth one. Returns the groups and the index after `)`.
fn groups<'t, 'a>(tokens: &'t [Token<'a>], start: usize) -> Result<(Vec<&'t [Token<'a>]>, usize), SqlError> {
    if tokens.get(start) != Some(&Token::Punct("(")) {
        return Err(err("42601", "expected ("));
    }
    let mut out = Vec::new();
    let mut depth = 0;
    let mut begin = start + 1;
    for (i, tok) in tokens.iter().enumerate().skip(start) {
        match *tok {
            Token::Punct("(") => depth += 1,
            Token::Punct(")") => {
                depth -= 1;
                if depth == 0 {
                    out.push(&tokens[begin..i]);
                    return Ok((out, i + 1));
                }
            }
            Token::Punct(",") if depth == 1 => {
                out.push(&tokens[begin..i]);
                begin = i + 1;
            }
            _ => {}
        }
    }
    Err(err("42601", "unbalanced parentheses"))
}

fn kw(tokens: &[Token<'_>], i: usize, keyword: &str) -> bool {
    tokens.get(i).is_some_and(|t| t.is_keyword(keyword))
}

fn apply(state: &mut ServerState, current: &str, sql: &str) -> Result<(), SqlError> {
    let t: Vec<Token<'_>> = tokenize(sql).into_iter().filter(|t| !t.is_trivia()).collect();

    if kw(&t, 0, "ALTER") && kw(&t, 1, "DATABASE") && kw(&t, 3, "RENAME") {
        let from = name(t.get(2))?;
        let to = name(t.get(5))?;
        let db = state
            .databases
            .remove(&from)
            .ok_or_else(|| err("3D000", format!("database \"{from}\" does not exist")))?;
        state.databases.insert(to, db);
        return Ok(());
    }

    if (kw(&t, 0, "CREATE") || kw(&t, 0, "ALTER")) && kw(&t, 1, "ROLE") {
        let role = name(t.get(2))?;
        let password = literal(t.last().filter(|t| matches!(t, Token::Literal(_))))?;
        let exists = state.roles.contains_key(&role);
        if kw(&t, 0, "CREATE") && exists {
            return Err(err("42710", format!("role \"{role}\" already exists")));
        }
        if kw(&t, 0, "ALTER") && !exists {
            return Err(err("42704", format!("role \"{role}\" does not exist")));
        }
        state.roles.insert(role, password);
        return Ok(());
    }

    if kw(&t, 0, "CREATE") && kw(&t, 1, "DATABASE") {
        let db = name(t.get(2))?;
        let owner = name(t.get(4))?;
        if state.databases.contains_key(&db) {
            return Err(err("42P04", format!("database \"{db}\" already exists")));
        }
        if !state.roles.contains_key(&owner) {
            return Err(err("42704", format!("role \"{owner}\" does not exist")));
        }
        state.databases.insert(
            db,
            Database {
                owner,
                ..Default::default()
            },
        );
        return Ok(());
    }

    if kw(&t, 0, "GRANT") {
        let db = name(t.get(5))?;
        let role = name(t.get(7))?;
        if !state.databases.contains_key(&db) {
            return Err(err("3D000", format!("database \"{db}\" does not exist")));
        }
        state.grants.push((db, role));
        return Ok(());
    }

    if kw(&t, 0, "CREATE") && kw(&t, 1, "TABLE") {
        let at = if kw(&t, 2, "IF") { 5 } else { 2 };
        let table = name(t.get(at))?;
        let (defs, _) = groups(&t, at + 1)?;
        let columns = defs
            .iter()
            .map(|def| name(def.first()))
            .collect::<Result<Vec<_>, _>>()?;
        let db = state.databases.entry(current.to_string()).or_default();
        if db.tables.contains_key(&table) {
            return Err(err("42P07", format!("relation \"{table}\" already exists")));
        }
        db.tables.insert(table, Table { columns, rows: Vec::new() });
        return Ok(());
    }

    if kw(&t, 0, "INSERT") && kw(&t, 1, "INTO") {
        state.inserts += 1;
        if state.drop_after_inserts.is_some_and(|n| state.inserts > n) {
            return Err(SqlError::Connection("server closed the connection unexpectedly".into()));
        }
        let table = name(t.get(2))?;
        let (cols, next) = groups(&t, 3)?;
        if !kw(&t, next, "VALUES") {
            return Err(err("42601", "syntax error at or near \"VALUES\""));
        }
        let (vals, _) = groups(&t, next + 1)?;
        let columns = cols
            .iter()
            .map(|c| name(c.first()))
            .collect::<Result<Vec<_>, _>>()?;
        let values: Vec<String> = vals
            .iter()
            .map(|v| {
                if v.len() == 1 && matches!(v[0], Token::Literal(_)) {
                    literal(v.first()).unwrap_or_default()
                } else {
                    v.iter().map(|t| t.text()).collect()
                }
            })
            .collect();

        let db = state
            .databases
            .get_mut(current)
            .ok_or_else(|| err("3D000", "no database"))?;
        let target = db
            .tables
            .get_mut(&table)
            .ok_or_else(|| err("42P01", format!("relation \"{table}\" does not exist")))?;
        if let Some(unknown) = columns.iter().find(|c| !target.columns.contains(c)) {
            return Err(err(
                "42703",
                format!("column \"{unknown}\" of relation \"{table}\" does not exist"),
            ));
        }
        // First column acts as the primary key.
        if target.rows.iter().any(|row| row.first() == values.first()) {
            return Err(err(
                "23505",
                format!("duplicate key value violates unique constraint \"{table}_pkey\""),
            ));
        }
        target.rows.push(values);
        return Ok(());
    }

    Err(err("42601", format!("syntax error at or near \"{}\"", t.first().map(|t| t.text()).unwrap_or(""))))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn server_config(admin_password: &str) -> ServerConfig {
    ServerConfig {
        admin_password: Some(admin_password.to_string()),
        ..ServerConfig::default()
    }
}

/// An empty file standing in for the `.mdb`; the fake extractor never reads it.
pub fn source_file(dir: &Path, file_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, b"").unwrap();
    path
}
