/*!
Welcome to `edgecov_pass`

Instrumentation-pass support for [`edgecov`]: decides which eligible sites of
a target receive a trace call and assigns each one its location id.

The pass mechanics themselves (walking the IR, splicing in the call) live with
whatever code-generation framework the embedder uses; this crate only carries
the policy — seeded, reproducible site selection and the post-pass summary.

The generated code is expected to call
[`__edgecov_trace`](edgecov::trace::__edgecov_trace) (or one of the safe trace
functions) once per visit of an instrumented site, passing the location id
assigned here.
*/
#![warn(clippy::cargo)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(
    clippy::unreadable_literal,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::module_name_repetitions
)]
#![cfg_attr(
    not(test),
    warn(
        missing_debug_implementations,
        missing_docs,
        trivial_numeric_casts,
        unused_extern_crates,
        unused_import_braces,
        unused_qualifications
    )
)]

pub mod selector;

pub use selector::{HardenMode, SelectionSummary, SiteSelector, DEFAULT_LOC_SPACE};
