use postbridge_service::MigrationController;

pub async fn run(controller: &MigrationController, reset: bool) -> anyhow::Result<()> {
    let report = controller.seed(reset).await?;
    if reset {
        println!("Removed {} existing posts", report.removed);
    }
    for post in &report.inserted {
        println!("  + {} ({}) [{}]", post.title, post.author, post.id);
    }
    println!(
        "\nInserted {} sample posts in phase {}",
        report.inserted.len(),
        controller.current_phase()
    );
    Ok(())
}
