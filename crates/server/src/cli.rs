//! Command-line flags. Each one overrides the matching env setting.

use clap::Parser;
use gorp_core::config::ScratchRetention;
use gorp_core::Config;

/// HTTP gateway in front of an Rserve anomaly-detection engine.
#[derive(Parser, Debug)]
#[command(name = "gorp", version, about)]
pub struct Cli {
    /// Address to listen on for HTTP requests.
    #[arg(long, env = "GORP_ADDR")]
    pub addr: Option<String>,

    /// Address of the Rserve daemon. Must be local.
    #[arg(long, env = "GORP_RADDR")]
    pub raddr: Option<String>,

    /// Leave scratch tables on disk after each request.
    #[arg(long, env = "GORP_KEEP_SCRATCH")]
    pub keep_scratch: bool,
}

impl Cli {
    pub fn apply(self, config: &mut Config) {
        if let Some(addr) = self.addr {
            config.gateway.listen_addr = addr;
        }
        if let Some(raddr) = self.raddr {
            config.rserve.addr = raddr;
        }
        if self.keep_scratch {
            config.scratch.retention = ScratchRetention::Keep;
        }
    }
}
