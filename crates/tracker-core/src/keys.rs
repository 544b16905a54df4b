//! Persisted key layout. One key per logical entity.

/// Prefix shared by every key this application writes.
pub const NAMESPACE: &str = "github-tracker-";

/// Prefix of the organization subsystem; `reset_organization_data` wipes it.
pub const ORG_NAMESPACE: &str = "github-tracker-org-";

pub mod org {
    pub const TAGS: &str = "github-tracker-org-tags";
    pub const PROJECTS: &str = "github-tracker-org-projects";
    pub const NOTES: &str = "github-tracker-org-notes";
    pub const TODOS: &str = "github-tracker-org-todos";
    pub const MACHINE: &str = "github-tracker-org-machine";
    pub const SYNC_QUEUE: &str = "github-tracker-org-sync-queue";
    pub const LAST_SYNC: &str = "github-tracker-org-last-sync";
    pub const MIGRATION_VERSION: &str = "github-tracker-org-migration-version";

    pub const ALL: [&str; 7] = [
        TAGS, PROJECTS, NOTES, TODOS, MACHINE, SYNC_QUEUE, LAST_SYNC,
    ];
}

/// Activity cache filled by the remote client, plus auth and settings.
pub mod cache {
    pub const USER_PROFILE: &str = "github-tracker-user-profile";
    pub const REPOSITORIES: &str = "github-tracker-repositories";
    pub const COMMITS: &str = "github-tracker-commits";
    pub const WEEKS: &str = "github-tracker-weeks";
    pub const GLOBAL_STATS: &str = "github-tracker-global-stats";
    pub const METADATA: &str = "github-tracker-metadata";
    pub const AUTH: &str = "github-tracker-auth";
    pub const SETTINGS: &str = "github-tracker-settings";

    pub const ALL: [&str; 8] = [
        USER_PROFILE,
        REPOSITORIES,
        COMMITS,
        WEEKS,
        GLOBAL_STATS,
        METADATA,
        AUTH,
        SETTINGS,
    ];
}

/// Keys written by earlier releases that are no longer produced.
pub mod legacy {
    pub const REPOS: &str = "github-tracker-repos";
    pub const USER_REPOS: &str = "github-tracker-user-repos";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_keys_live_under_org_namespace() {
        for key in org::ALL.iter().chain([org::MIGRATION_VERSION].iter()) {
            assert!(key.starts_with(ORG_NAMESPACE), "{key}");
        }
    }

    #[test]
    fn cache_keys_do_not_collide_with_org_namespace() {
        for key in cache::ALL {
            assert!(key.starts_with(NAMESPACE));
            assert!(!key.starts_with(ORG_NAMESPACE), "{key}");
        }
    }
}
