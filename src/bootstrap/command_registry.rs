use clap::{value_parser, Arg, ArgMatches, Command};

use crate::feed::DeliveryStrategy;

/// `server` 子命令上的覆盖项，优先级高于所有配置源
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub strategy: Option<DeliveryStrategy>,
}

impl ServerOverrides {
    /// 从 `server` 子命令的参数中读取
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            host: matches.get_one::<String>("host").cloned(),
            port: matches.get_one::<u16>("port").copied(),
            workers: matches.get_one::<usize>("workers").copied(),
            strategy: matches.get_one::<DeliveryStrategy>("strategy").copied(),
        }
    }

    /// 转成点分路径的配置覆盖
    pub fn into_pairs(self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(host) = self.host {
            pairs.push(("server.host".to_string(), host));
        }
        if let Some(port) = self.port {
            pairs.push(("server.port".to_string(), port.to_string()));
        }
        if let Some(workers) = self.workers {
            pairs.push(("server.workers".to_string(), workers.to_string()));
        }
        if let Some(strategy) = self.strategy {
            pairs.push(("feed.strategy".to_string(), strategy.to_string()));
        }
        pairs
    }
}

fn parse_strategy(raw: &str) -> Result<DeliveryStrategy, String> {
    raw.parse()
}

/// 构建完整的命令行应用
pub fn build_app() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about("图片 feed 后端服务")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("server")
                .about("启动 Web 服务器")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("设置服务器主机地址"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .value_parser(value_parser!(u16).range(1..))
                        .help("设置服务器端口"),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("WORKERS")
                        .value_parser(value_parser!(usize))
                        .help("设置工作线程数"),
                )
                .arg(
                    Arg::new("strategy")
                        .short('s')
                        .long("strategy")
                        .value_name("STRATEGY")
                        .value_parser(parse_strategy)
                        .help("下发策略: random | paginated | per-client"),
                ),
        )
        .subcommand(Command::new("version").about("显示版本信息"))
}

/// 打印版本信息
pub fn handle_version_command() {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}
