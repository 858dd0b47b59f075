/*! Integration tests for sptree.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - version: Version vector arithmetic and causal ordering
 * - lock: Reentrant program locks across threads
 * - document: Per-document state, versions and the node arena
 * - node: Tree links, client data and conflicts
 * - container: Typed child collections and observation numbering
 * - events: Property, composite and structure change notification
 * - factory: Node creation, initializers and document copies
 * - serializer: Whole-document store and load
 * - scenario: End-to-end edits of a small program
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("sptree=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod document;
mod events;
mod factory;
mod version;
