//! Token identifiers and the process-wide token table.
//!
//! Every token id has a stable name. Keyword ids are named `SQL_<KEYWORD>`
//! and that prefix is the only thing that makes a word reserved: the keyword
//! lookup map is derived from the names table, never from a second list.

use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

use hashbrown::HashMap;
use smallvec::SmallVec;

/// Name prefix shared by all keyword tokens.
pub const KEYWORD_PREFIX: &str = "SQL_";

/// Owned token text. Most tokens fit inline.
pub type TokenText = SmallVec<[u8; 24]>;

macro_rules! token_table {
    (
        $( $variant:ident => $name:literal, )*
        ;
        $( $kw_variant:ident => $keyword:literal, )*
    ) => {
        /// Identifier of a lexical token class.
        ///
        /// Ordinals are dense in `0..LAST_TOKEN`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum TokenId {
            $( $variant, )*
            $( $kw_variant, )*
        }

        impl TokenId {
            /// Every token id, in ordinal order.
            pub const ALL: &'static [Self] = &[
                $( Self::$variant, )*
                $( Self::$kw_variant, )*
            ];
        }

        static TOKEN_NAMES: &[&str] = &[
            $( $name, )*
            $( concat!("SQL_", $keyword), )*
        ];
    };
}

token_table! {
    Unknown => "UNKNOWN",
    Le => "LE",
    Ge => "GE",
    Lt => "LT",
    Gt => "GT",
    Eq => "EQ",
    Ne => "NE",
    String => "STRING",
    Comment => "COMMENT",
    CommentMysql => "COMMENT_MYSQL",
    Literal => "LITERAL",
    Integer => "INTEGER",
    Float => "FLOAT",
    Dot => "DOT",
    Comma => "COMMA",
    Assign => "ASSIGN",
    OBrace => "OBRACE",
    CBrace => "CBRACE",
    Semicolon => "SEMICOLON",
    Star => "STAR",
    Plus => "PLUS",
    Minus => "MINUS",
    Div => "DIV",
    BitwiseAnd => "BITWISE_AND",
    BitwiseOr => "BITWISE_OR",
    BitwiseXor => "BITWISE_XOR",
    LogicalAnd => "LOGICAL_AND",
    LogicalOr => "LOGICAL_OR",
    ;
    SqlAccessible => "ACCESSIBLE",
    SqlAdd => "ADD",
    SqlAll => "ALL",
    SqlAlter => "ALTER",
    SqlAnalyze => "ANALYZE",
    SqlAnd => "AND",
    SqlAs => "AS",
    SqlAsc => "ASC",
    SqlAsensitive => "ASENSITIVE",
    SqlBefore => "BEFORE",
    SqlBetween => "BETWEEN",
    SqlBigint => "BIGINT",
    SqlBinary => "BINARY",
    SqlBlob => "BLOB",
    SqlBoth => "BOTH",
    SqlBy => "BY",
    SqlCall => "CALL",
    SqlCascade => "CASCADE",
    SqlCase => "CASE",
    SqlChange => "CHANGE",
    SqlChar => "CHAR",
    SqlCharacter => "CHARACTER",
    SqlCheck => "CHECK",
    SqlCollate => "COLLATE",
    SqlColumn => "COLUMN",
    SqlCondition => "CONDITION",
    SqlConstraint => "CONSTRAINT",
    SqlContinue => "CONTINUE",
    SqlConvert => "CONVERT",
    SqlCreate => "CREATE",
    SqlCross => "CROSS",
    SqlCurrentDate => "CURRENT_DATE",
    SqlCurrentTime => "CURRENT_TIME",
    SqlCurrentTimestamp => "CURRENT_TIMESTAMP",
    SqlCurrentUser => "CURRENT_USER",
    SqlCursor => "CURSOR",
    SqlDatabase => "DATABASE",
    SqlDatabases => "DATABASES",
    SqlDayHour => "DAY_HOUR",
    SqlDayMicrosecond => "DAY_MICROSECOND",
    SqlDayMinute => "DAY_MINUTE",
    SqlDaySecond => "DAY_SECOND",
    SqlDec => "DEC",
    SqlDecimal => "DECIMAL",
    SqlDeclare => "DECLARE",
    SqlDefault => "DEFAULT",
    SqlDelayed => "DELAYED",
    SqlDelete => "DELETE",
    SqlDesc => "DESC",
    SqlDescribe => "DESCRIBE",
    SqlDeterministic => "DETERMINISTIC",
    SqlDistinct => "DISTINCT",
    SqlDistinctrow => "DISTINCTROW",
    SqlDiv => "DIV",
    SqlDouble => "DOUBLE",
    SqlDrop => "DROP",
    SqlDual => "DUAL",
    SqlEach => "EACH",
    SqlElse => "ELSE",
    SqlElseif => "ELSEIF",
    SqlEnclosed => "ENCLOSED",
    SqlEscaped => "ESCAPED",
    SqlExists => "EXISTS",
    SqlExit => "EXIT",
    SqlExplain => "EXPLAIN",
    SqlFalse => "FALSE",
    SqlFetch => "FETCH",
    SqlFloat => "FLOAT",
    SqlFloat4 => "FLOAT4",
    SqlFloat8 => "FLOAT8",
    SqlFor => "FOR",
    SqlForce => "FORCE",
    SqlForeign => "FOREIGN",
    SqlFrom => "FROM",
    SqlFulltext => "FULLTEXT",
    SqlGrant => "GRANT",
    SqlGroup => "GROUP",
    SqlHaving => "HAVING",
    SqlHighPriority => "HIGH_PRIORITY",
    SqlHourMicrosecond => "HOUR_MICROSECOND",
    SqlHourMinute => "HOUR_MINUTE",
    SqlHourSecond => "HOUR_SECOND",
    SqlIf => "IF",
    SqlIgnore => "IGNORE",
    SqlIn => "IN",
    SqlIndex => "INDEX",
    SqlInfile => "INFILE",
    SqlInner => "INNER",
    SqlInout => "INOUT",
    SqlInsensitive => "INSENSITIVE",
    SqlInsert => "INSERT",
    SqlInt => "INT",
    SqlInt1 => "INT1",
    SqlInt2 => "INT2",
    SqlInt3 => "INT3",
    SqlInt4 => "INT4",
    SqlInt8 => "INT8",
    SqlInteger => "INTEGER",
    SqlInterval => "INTERVAL",
    SqlInto => "INTO",
    SqlIs => "IS",
    SqlIterate => "ITERATE",
    SqlJoin => "JOIN",
    SqlKey => "KEY",
    SqlKeys => "KEYS",
    SqlKill => "KILL",
    SqlLeading => "LEADING",
    SqlLeave => "LEAVE",
    SqlLeft => "LEFT",
    SqlLike => "LIKE",
    SqlLimit => "LIMIT",
    SqlLinear => "LINEAR",
    SqlLines => "LINES",
    SqlLoad => "LOAD",
    SqlLocaltime => "LOCALTIME",
    SqlLocaltimestamp => "LOCALTIMESTAMP",
    SqlLock => "LOCK",
    SqlLong => "LONG",
    SqlLongblob => "LONGBLOB",
    SqlLongtext => "LONGTEXT",
    SqlLoop => "LOOP",
    SqlLowPriority => "LOW_PRIORITY",
    SqlMasterSslVerifyServerCert => "MASTER_SSL_VERIFY_SERVER_CERT",
    SqlMatch => "MATCH",
    SqlMediumblob => "MEDIUMBLOB",
    SqlMediumint => "MEDIUMINT",
    SqlMediumtext => "MEDIUMTEXT",
    SqlMiddleint => "MIDDLEINT",
    SqlMinuteMicrosecond => "MINUTE_MICROSECOND",
    SqlMinuteSecond => "MINUTE_SECOND",
    SqlMod => "MOD",
    SqlModifies => "MODIFIES",
    SqlNatural => "NATURAL",
    SqlNot => "NOT",
    SqlNoWriteToBinlog => "NO_WRITE_TO_BINLOG",
    SqlNull => "NULL",
    SqlNumeric => "NUMERIC",
    SqlOn => "ON",
    SqlOptimize => "OPTIMIZE",
    SqlOption => "OPTION",
    SqlOptionally => "OPTIONALLY",
    SqlOr => "OR",
    SqlOrder => "ORDER",
    SqlOut => "OUT",
    SqlOuter => "OUTER",
    SqlOutfile => "OUTFILE",
    SqlPrecision => "PRECISION",
    SqlPrimary => "PRIMARY",
    SqlProcedure => "PROCEDURE",
    SqlPurge => "PURGE",
    SqlRange => "RANGE",
    SqlRead => "READ",
    SqlReads => "READS",
    SqlReadWrite => "READ_WRITE",
    SqlReal => "REAL",
    SqlReferences => "REFERENCES",
    SqlRegexp => "REGEXP",
    SqlRelease => "RELEASE",
    SqlRename => "RENAME",
    SqlRepeat => "REPEAT",
    SqlReplace => "REPLACE",
    SqlRequire => "REQUIRE",
    SqlRestrict => "RESTRICT",
    SqlReturn => "RETURN",
    SqlRevoke => "REVOKE",
    SqlRight => "RIGHT",
    SqlRlike => "RLIKE",
    SqlSchema => "SCHEMA",
    SqlSchemas => "SCHEMAS",
    SqlSecondMicrosecond => "SECOND_MICROSECOND",
    SqlSelect => "SELECT",
    SqlSensitive => "SENSITIVE",
    SqlSeparator => "SEPARATOR",
    SqlSet => "SET",
    SqlShow => "SHOW",
    SqlSmallint => "SMALLINT",
    SqlSpatial => "SPATIAL",
    SqlSpecific => "SPECIFIC",
    SqlSql => "SQL",
    SqlSqlexception => "SQLEXCEPTION",
    SqlSqlstate => "SQLSTATE",
    SqlSqlwarning => "SQLWARNING",
    SqlSqlBigResult => "SQL_BIG_RESULT",
    SqlSqlCalcFoundRows => "SQL_CALC_FOUND_ROWS",
    SqlSqlSmallResult => "SQL_SMALL_RESULT",
    SqlSsl => "SSL",
    SqlStarting => "STARTING",
    SqlStraightJoin => "STRAIGHT_JOIN",
    SqlTable => "TABLE",
    SqlTerminated => "TERMINATED",
    SqlThen => "THEN",
    SqlTinyblob => "TINYBLOB",
    SqlTinyint => "TINYINT",
    SqlTinytext => "TINYTEXT",
    SqlTo => "TO",
    SqlTrailing => "TRAILING",
    SqlTrigger => "TRIGGER",
    SqlTrue => "TRUE",
    SqlUndo => "UNDO",
    SqlUnion => "UNION",
    SqlUnique => "UNIQUE",
    SqlUnlock => "UNLOCK",
    SqlUnsigned => "UNSIGNED",
    SqlUpdate => "UPDATE",
    SqlUsage => "USAGE",
    SqlUse => "USE",
    SqlUsing => "USING",
    SqlUtcDate => "UTC_DATE",
    SqlUtcTime => "UTC_TIME",
    SqlUtcTimestamp => "UTC_TIMESTAMP",
    SqlValues => "VALUES",
    SqlVarbinary => "VARBINARY",
    SqlVarchar => "VARCHAR",
    SqlVarcharacter => "VARCHARACTER",
    SqlVarying => "VARYING",
    SqlWhen => "WHEN",
    SqlWhere => "WHERE",
    SqlWhile => "WHILE",
    SqlWith => "WITH",
    SqlWrite => "WRITE",
    SqlXor => "XOR",
    SqlYearMonth => "YEAR_MONTH",
    SqlZerofill => "ZEROFILL",
}

/// Number of token ids; every id is `< LAST_TOKEN`.
pub const LAST_TOKEN: usize = TokenId::ALL.len();

// ---------------------------------------------------------------------------
// Lookup tables
// ---------------------------------------------------------------------------

struct TokenTable {
    by_name: HashMap<&'static str, TokenId>,
    /// Keyword spelling (upper case, prefix stripped) to id.
    keywords: HashMap<&'static [u8], TokenId>,
    longest_keyword: usize,
}

static TABLE: LazyLock<TokenTable> = LazyLock::new(|| {
    let mut by_name = HashMap::with_capacity(LAST_TOKEN);
    let mut keywords = HashMap::new();
    let mut longest_keyword = 0;

    for &id in TokenId::ALL {
        let name = id.name();
        by_name.insert(name, id);
        if let Some(keyword) = name.strip_prefix(KEYWORD_PREFIX) {
            longest_keyword = longest_keyword.max(keyword.len());
            keywords.insert(keyword.as_bytes(), id);
        }
    }

    TokenTable {
        by_name,
        keywords,
        longest_keyword,
    }
});

impl TokenId {
    /// Canonical name of this token id, e.g. `"COMMA"` or `"SQL_SELECT"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        TOKEN_NAMES[self as usize]
    }

    /// Id with the given ordinal, `None` once `index >= LAST_TOKEN`.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Inverse of [`TokenId::name`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        TABLE.by_name.get(name).copied()
    }

    /// Ordinal of this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether this id is a reserved SQL keyword.
    #[must_use]
    pub fn is_keyword(self) -> bool {
        self.name().starts_with(KEYWORD_PREFIX)
    }

    /// Keyword spelling without the prefix (`SQL_SELECT` -> `SELECT`).
    #[must_use]
    pub fn keyword(self) -> Option<&'static str> {
        self.name().strip_prefix(KEYWORD_PREFIX)
    }

    /// Iterate over all keyword ids.
    pub fn keywords() -> impl Iterator<Item = Self> {
        Self::ALL.iter().copied().filter(|id| id.is_keyword())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of the token with ordinal `id`, `None` if there is no such token.
#[must_use]
pub fn token_name(id: usize) -> Option<&'static str> {
    TOKEN_NAMES.get(id).copied()
}

/// Case-insensitive keyword lookup without allocation.
#[must_use]
pub fn lookup_keyword(word: &[u8]) -> Option<TokenId> {
    let table = &*TABLE;
    if word.is_empty() || word.len() > table.longest_keyword {
        return None;
    }
    let mut upper = [0_u8; 64];
    let upper = &mut upper[..word.len()];
    upper.copy_from_slice(word);
    upper.make_ascii_uppercase();
    table.keywords.get(&*upper).copied()
}

/// Map a word to its keyword id, or [`TokenId::Literal`] if it is not a
/// reserved word.
#[must_use]
pub fn keyword_id(word: &str) -> TokenId {
    lookup_keyword(word.as_bytes()).unwrap_or(TokenId::Literal)
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A classified unit of SQL text.
///
/// `text` is the token's value: quotes, comment markers and doubled-quote
/// escapes are removed. `offset..offset + byte_length` is the raw extent in
/// the input, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    id: TokenId,
    text: TokenText,
    offset: usize,
    byte_length: usize,
}

impl Token {
    #[must_use]
    pub fn new(id: TokenId, text: TokenText, offset: usize, byte_length: usize) -> Self {
        Self {
            id,
            text,
            offset,
            byte_length,
        }
    }

    #[must_use]
    pub const fn id(&self) -> TokenId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &[u8] {
        &self.text
    }

    /// Token text as `&str` when it is valid UTF-8.
    #[must_use]
    pub fn text_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.text).ok()
    }

    #[must_use]
    pub fn into_text(self) -> TokenText {
        self.text
    }

    /// Start of the raw extent in the tokenized input.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the raw extent, delimiters and markers included.
    #[must_use]
    pub const fn byte_length(&self) -> usize {
        self.byte_length
    }

    #[must_use]
    pub const fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.byte_length
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.id, String::from_utf8_lossy(&self.text))
    }
}
