//! Router tests - tree construction, name checks and path resolution.
