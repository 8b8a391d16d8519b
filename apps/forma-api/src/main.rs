use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = forma_api::Args::parse();

	forma_api::run(args).await
}
