use clap::ArgMatches;

use photo_feed::error::AppResult;
use photo_feed::{build_app, handle_version_command, load_config, AppBootstrap, ServerOverrides};

#[actix_web::main]
async fn main() {
    // 构建命令行应用
    let matches: ArgMatches = build_app().get_matches();

    match matches.subcommand() {
        Some(("server", sub_matches)) => {
            if let Err(e) = handle_server_command(sub_matches).await {
                eprintln!("服务启动失败: {}", e);
                std::process::exit(1);
            }
        }
        Some(("version", _)) => {
            handle_version_command();
        }
        _ => {
            // subcommand_required(true) 保证不会走到这里
            eprintln!("未知命令，请使用 --help 查看可用命令");
            std::process::exit(1);
        }
    }
}

async fn handle_server_command(matches: &ArgMatches) -> AppResult<()> {
    let overrides = ServerOverrides::from_matches(matches);
    let config = load_config(overrides.into_pairs())?;

    AppBootstrap::new().with_config(config).run().await
}
