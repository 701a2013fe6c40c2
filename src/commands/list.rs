//! List commands implementation

use crate::backends;

/// List all supported backends
pub fn list_backends() {
    print!("{}", backends::backend_help());
}
