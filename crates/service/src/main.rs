#[tokio::main]
async fn main() -> anyhow::Result<()> {
    asrs_observability::init();

    let config = asrs_infra::WarehouseConfig::from_env()?;
    let warehouse = asrs_service::start(&config).await?;

    let availability = warehouse.availability().all().await?;
    tracing::info!(
        backend = warehouse.backend(),
        items = availability.len(),
        in_stock = availability.values().filter(|n| **n > 0).count(),
        "warehouse ready"
    );
    Ok(())
}
