use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palletflow_core::app::{AppBuilder, CreateTask, ProductionNumberRequest, ScanMode};
use palletflow_core::config::Settings;
use palletflow_core::domain::{DriverId, LocationKind, TaskStatus, TaskType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // (A) 設定とログ
    let settings = Settings::load().context("loading settings")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = AppBuilder::new().settings(settings).build()?;

    // (B) マスタデータ
    let ayran = app.catalog.create_product("Ayran 200ml", Some(10)).await?;
    let line = app
        .catalog
        .create_location(LocationKind::ProductionLine, "Hat 1", "PL-1", None)
        .await?;
    let depot = app
        .catalog
        .create_location(LocationKind::Warehouse, "Depo A", "WH-A", Some(40))
        .await?;
    let truck = app
        .catalog
        .create_location(LocationKind::Truck, "34 ABC 12", "TR-1", Some(12))
        .await?;
    let driver = DriverId::new("sofor-1");

    // (C) 生産ラインから倉庫へ（遷移 API で完了させる）
    let to_depot = app
        .orchestrator
        .create_task(CreateTask {
            product_id: ayran.id,
            task_type: TaskType::ProductionToWarehouse,
            from_id: Some(line.id),
            to_id: depot.id,
            assigned_to: driver.clone(),
            pallet_quantity: 6,
            production_number: ProductionNumberRequest::Auto,
        })
        .await?;
    app.orchestrator
        .transition(to_depot.id, TaskStatus::InProgress)
        .await?;
    app.orchestrator
        .transition(to_depot.id, TaskStatus::Completed)
        .await?;
    println!(
        "warehouse task done: production_number={} pallets={}",
        to_depot.production_number, to_depot.pallet_quantity
    );

    // (D) 倉庫からトラックへ（QR スキャンで進める）
    let to_truck = app
        .orchestrator
        .create_task(CreateTask {
            product_id: ayran.id,
            task_type: TaskType::WarehouseToTruck,
            from_id: None,
            to_id: truck.id,
            assigned_to: driver.clone(),
            pallet_quantity: 4,
            production_number: ProductionNumberRequest::Auto,
        })
        .await?;
    println!(
        "truck task created: from={} production_number={}",
        to_truck.from.name, to_truck.production_number
    );

    app.scanner
        .scan(to_truck.id, &driver, ScanMode::Pickup, &to_truck.from.qr_code)
        .await?;
    for pallet in to_truck.pallets.iter() {
        app.scanner
            .scan(to_truck.id, &driver, ScanMode::Pallet, &pallet.code)
            .await?;
    }
    let outcome = app
        .scanner
        .scan(to_truck.id, &driver, ScanMode::Delivery, &to_truck.to.qr_code)
        .await?;
    println!(
        "delivery scan: delivered={} completed={} status={}",
        outcome.delivered, outcome.completed, outcome.task.status
    );

    // (E) 集計
    println!(
        "{}",
        serde_json::to_string_pretty(&app.reports.location_stats(depot.id).await?)?
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&app.reports.location_stats(truck.id).await?)?
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&app.reports.task_summary().await?)?
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&app.reports.expiring_batches(30).await?)?
    );
    Ok(())
}
