//! Store naming and the expected-store-set invariant.
//!
//! Every cache generation owns exactly five named stores, derived from the
//! build's generation identifier. Any durable store whose name is outside
//! the current generation's set is garbage and gets deleted during the
//! activation cleanup pass.

use std::collections::HashSet;
use std::fmt;

/// The five logical cache purposes, one store of each per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Navigation entry documents and the offline fallback page.
    AppShell,
    /// Build-output assets matched by file extension.
    Static,
    /// Same-origin JSON API responses.
    Dynamic,
    /// Remote REST responses from the hosted backend.
    SupabaseRest,
    /// Remote binary storage objects from the hosted backend.
    SupabaseStorage,
}

impl StoreKind {
    pub const ALL: [StoreKind; 5] = [
        StoreKind::AppShell,
        StoreKind::Static,
        StoreKind::Dynamic,
        StoreKind::SupabaseRest,
        StoreKind::SupabaseStorage,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            StoreKind::AppShell => "app-shell",
            StoreKind::Static => "static",
            StoreKind::Dynamic => "dynamic",
            StoreKind::SupabaseRest => "supabase-rest",
            StoreKind::SupabaseStorage => "supabase-storage",
        }
    }

    /// Full store name for a generation, e.g. `app-shell-v3f9ac2`.
    pub fn store_name(&self, generation: &str) -> String {
        format!("{}-v{}", self.prefix(), generation)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// The set of store names valid for a generation.
///
/// Computed at daemon activation; every durable store outside this set
/// is deleted before the daemon begins serving requests.
pub fn expected_store_names(generation: &str) -> HashSet<String> {
    StoreKind::ALL
        .iter()
        .map(|kind| kind.store_name(generation))
        .collect()
}

/// Whether `name` is an app-shell store left behind by an earlier generation.
///
/// Used at activation time to distinguish an upgrade from a first-ever
/// install: a brand-new installation has no prior app-shell store and must
/// never produce an update prompt.
pub fn is_previous_app_shell(name: &str, generation: &str) -> bool {
    name.starts_with("app-shell-v") && name != StoreKind::AppShell.store_name(generation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_name_includes_generation() {
        assert_eq!(StoreKind::AppShell.store_name("abc123"), "app-shell-vabc123");
        assert_eq!(StoreKind::SupabaseRest.store_name("abc123"), "supabase-rest-vabc123");
    }

    #[test]
    fn test_expected_set_has_five_names() {
        let set = expected_store_names("g1");
        assert_eq!(set.len(), 5);
        assert!(set.contains("app-shell-vg1"));
        assert!(set.contains("static-vg1"));
        assert!(set.contains("dynamic-vg1"));
        assert!(set.contains("supabase-rest-vg1"));
        assert!(set.contains("supabase-storage-vg1"));
    }

    #[test]
    fn test_previous_app_shell_detection() {
        assert!(is_previous_app_shell("app-shell-vold", "new"));
        assert!(!is_previous_app_shell("app-shell-vnew", "new"));
        assert!(!is_previous_app_shell("static-vold", "new"));
    }
}
