//! Lexical tokenizer for the SQL statements a MySQL proxy sees on the wire.
//!
//! Only lexical structure is recovered: keywords, identifiers, literals,
//! operators and comments. There is no grammar. The keyword set is the
//! MySQL reserved-word list and is driven entirely by the token table in
//! [`token`].

pub mod lexer;
pub mod token;

pub use lexer::{tokenize, tokenize_str};
pub use token::{
    KEYWORD_PREFIX, LAST_TOKEN, Token, TokenId, TokenText, keyword_id, lookup_keyword, token_name,
};
