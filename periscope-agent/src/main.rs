//! Standalone agent binary, used when the controller is configured with
//! an explicit agent program instead of re-invoking its own executable.

use periscope_agent::{agent_main, WorkerRegistry};

fn main() {
    std::process::exit(agent_main(WorkerRegistry::with_builtins()));
}
