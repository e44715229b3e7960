pub mod context;
pub mod decision;

pub use context::CommandContext;
pub use decision::{Decision, PolicyDecision};

use crate::commands::CommandPolicy;
use crate::commands::prefix::PrefixPolicy;
use crate::config::Config;
use crate::error::ToolError;
use crate::parse::ArgSpec;
use crate::request::{CommandRequest, Tool};

/// Startup-built, read-only policy for both tools.
pub struct PolicyEngine {
    infra_args: ArgSpec,
    cluster_args: ArgSpec,
    cluster: PrefixPolicy,
}

impl PolicyEngine {
    /// Build the engine from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            infra_args: ArgSpec::from_config(&config.infra.arguments),
            cluster_args: ArgSpec::from_config(&config.cluster.arguments),
            cluster: PrefixPolicy::from_config(&config.cluster),
        }
    }

    pub fn args(&self, tool: Tool) -> &ArgSpec {
        match tool {
            Tool::Infra => &self.infra_args,
            Tool::Cluster => &self.cluster_args,
        }
    }

    /// Reject scan, then grammar parse.
    pub fn context<'a>(&self, request: &'a CommandRequest) -> Result<CommandContext<'a>, ToolError> {
        let spec = self.args(request.tool);
        spec.check_rejected(&request.argv)?;
        let args = spec.parse(&request.argv)?;
        Ok(CommandContext::new(request, args))
    }

    /// Classify a cluster request. Infra requests need the loaded catalog.
    pub fn classify_cluster(&self, ctx: &CommandContext) -> PolicyDecision {
        self.cluster.classify(ctx)
    }

    /// Sanitize and classify a cluster command without running anything.
    pub fn check_cluster(&self, request: &CommandRequest) -> Result<PolicyDecision, ToolError> {
        let ctx = self.context(request)?;
        self.classify_cluster(&ctx).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Credentials, Mode};

    fn engine() -> PolicyEngine {
        PolicyEngine::from_config(&Config::default_config())
    }

    fn request(tool: Tool, cmd: &str) -> CommandRequest {
        CommandRequest::parse(tool, cmd, Mode::ReadOnly, Credentials::default()).unwrap()
    }

    #[test]
    fn reject_runs_before_parse() {
        // --os-cloud is deleted, --os-token is rejected: the reject wins.
        let req = request(Tool::Infra, "--os-cloud x --os-token y server list");
        let err = engine().context(&req).unwrap_err();
        assert_eq!(
            err,
            ToolError::ArgumentRejected {
                flag: "--os-token".into()
            }
        );
    }

    #[test]
    fn deleted_flag_is_invalid_command() {
        let req = request(Tool::Infra, "--os-cloud x server list");
        assert_eq!(engine().context(&req).unwrap_err().kind(), "invalid_command");
    }

    #[test]
    fn check_cluster_allows_get() {
        let req = request(Tool::Cluster, "oc get pods");
        assert!(engine().check_cluster(&req).unwrap().is_allowed());
    }

    #[test]
    fn check_cluster_denies_delete() {
        let req = request(Tool::Cluster, "oc delete pod x");
        assert_eq!(
            engine().check_cluster(&req).unwrap_err().kind(),
            "authorization_denied"
        );
    }
}
