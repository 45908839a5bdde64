//! Street-name tokenizer for address conflation.
//!
//! The canonical token string produced here is the sole equality key used to
//! decide whether two street names refer to the same street. It must be
//! deterministic: identical input with the same [`TokenTable`] always yields
//! identical output, in every worker and in the grouping pass. Common street
//! types (`street`/`st`, `avenue`/`ave`, ...) are equated even without a table.
//!
//! ```
//! use conflate_tokenize::{Tokenizer, TokenTable};
//!
//! let table = TokenTable::for_languages(&["en"]).unwrap();
//! let tokenizer = Tokenizer::new(Some(table));
//! assert_eq!(tokenizer.normalize("Main Street"), tokenizer.normalize("main st."));
//! ```

pub mod error;
pub mod table;
pub mod tokenizer;

pub use error::{TokenizeError, TokenizeResult};
pub use table::{TokenTable, MAX_PHRASE_TOKENS};
pub use tokenizer::{tokenize, Tokenizer};
