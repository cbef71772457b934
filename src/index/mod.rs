pub mod lexical;
pub mod vector;

pub use lexical::{InMemoryLexicalIndex, LexicalIndex};
pub use vector::{FlatVectorIndex, VectorIndex};
