pub const PASS_STARTS: &str = "fleet_migrator_pass_starts";
pub const PASS_TIME: &str = "fleet_migrator_pass_duration_seconds";

pub const HOSTS_PLANNED: &str = "fleet_migrator_hosts_planned";
pub const HOSTS_MIGRATED: &str = "fleet_migrator_hosts_migrated";
// Labelled with the stage the host is stuck at
pub const HOSTS_STUCK: &str = "fleet_migrator_hosts_stuck";

pub const LOCK_ATTEMPTS: &str = "fleet_migrator_lock_attempts";
pub const ASSIGN_ATTEMPTS: &str = "fleet_migrator_drone_assign_attempts";
pub const RENAME_ATTEMPTS: &str = "fleet_migrator_rename_attempts";

pub const READINESS_TICKS: &str = "fleet_migrator_readiness_ticks";
pub const READINESS_TIMEOUTS: &str = "fleet_migrator_readiness_timeouts";

pub const ROLLBACK_BATCHES: &str = "fleet_migrator_rollback_batches";
