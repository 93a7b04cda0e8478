// Module layout (Clean Architecture style)
// - bootstrap: configuration, backend selection and router assembly
// - infrastructure: filesystem, Google Drive and HTTP storage adapters
// - presentation: HTTP handlers
// - application: ports, use cases, session and the sync controller
// - domain: file records, categories and naming rules

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
