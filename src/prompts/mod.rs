//! LLM prompts for study-note generation.
//!
//! - [`notes`] - outline drafting and content expansion prompts
//!
//! # Usage
//!
//! ```no_run
//! use note_forge::prompts::{build_content_prompt, build_structure_prompt};
//!
//! let outline = build_structure_prompt("The Krebs cycle", None).expect("renders");
//! let content = build_content_prompt("The Krebs cycle", "# Krebs cycle\n## Steps", None)
//!     .expect("renders");
//! ```

pub mod notes;

pub use notes::{
    build_content_prompt, build_structure_prompt, NotePrompt, CONTENT_SYSTEM,
    CONTENT_USER_TEMPLATE, STRUCTURE_SYSTEM, STRUCTURE_USER_TEMPLATE,
};
