//! Process environment shared between nested harness runs.

use tracing::warn;

/// Carries the recursion depth from a harness run into the agents it spawns.
pub const DEPTH_ENV_VAR: &str = "AGENT_TEST_DEPTH";

/// Starting depth for this process. Missing or unparsable values count as 0.
pub fn starting_depth_from_env() -> u32 {
    parse_depth(std::env::var(DEPTH_ENV_VAR).ok().as_deref())
}

pub fn parse_depth(raw: Option<&str>) -> u32 {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return 0;
    };
    match raw.parse::<u32>() {
        Ok(depth) => depth,
        Err(err) => {
            warn!(value = raw, err = %err, "ignoring unparsable {DEPTH_ENV_VAR}");
            0
        }
    }
}
