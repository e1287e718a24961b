use rusty_ext_hash::*;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ShellConfig::from_env()?;

    let args: Vec<String> = std::env::args().collect();
    let is_repl = if let Some(arg) = args.get(1) {
        arg == "--repl"
    } else {
        false
    };

    if is_repl {
        run_repl(config).await
    } else {
        process_from_stdin(config).await
    }
}
