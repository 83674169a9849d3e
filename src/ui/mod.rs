//! Presentation types shared by the pipeline and its hosts.
//!
//! [`span`] holds [`span::StyledText`], the text-plus-style-runs value every
//! stage of the pipeline passes along and a host finally turns into ratatui
//! lines.

pub mod span;
