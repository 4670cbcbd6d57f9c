//! fixline-watch - follow the live event stream from a terminal.
//!
//! Connects with the settings from the environment, prints every derived
//! notification and status change, and disconnects cleanly on Ctrl-C.

use std::sync::Arc;

use fixline_client::logging::{self, DEFAULT_FILTER};
use fixline_client::notifications::shared_settings;
use fixline_client::{
    log_info, log_warn, ClientConfig, ClientEvent, EventClient, InventoryAlerts,
    IssueActivityAlerts, IssueAlerts, NotificationSettings, NotificationSink, PlainFormatter,
    RepairNotifications, UserActivityAlerts,
};
use fixline_shared::NotificationRecord;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(DEFAULT_FILTER);

    let config = ClientConfig::from_env()?;
    let client = EventClient::new(config);

    let formatter = Arc::new(PlainFormatter::default());
    let sink: Arc<dyn NotificationSink> = Arc::new(|record: NotificationRecord| {
        log_info!("[{:?}] {}: {}", record.severity, record.title, record.body);
    });

    let settings = shared_settings(NotificationSettings::default());

    let repairs = Arc::new(RepairNotifications::new(formatter.clone(), sink.clone()));
    let issues = Arc::new(IssueAlerts::new(formatter.clone(), sink.clone()));
    let activity = Arc::new(IssueActivityAlerts::new(formatter, sink.clone(), settings.clone()));
    let inventory = Arc::new(InventoryAlerts::new(sink.clone(), settings.clone()));
    let users = Arc::new(UserActivityAlerts::new(sink, settings));
    let _repair_subscriptions = repairs.attach(&client);
    let _issue_subscription = issues.attach(&client);
    let _activity_subscriptions = activity.attach(&client);
    let _inventory_subscriptions = inventory.attach(&client);
    let _user_subscriptions = users.attach(&client);

    let mut events = client.events();
    client.init();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    log_warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            event = events.recv() => match event {
                Ok(ClientEvent::Connected) => log_info!("Status: connected"),
                Ok(ClientEvent::Disconnected { reason }) => log_info!("Status: disconnected ({})", reason),
                Ok(ClientEvent::Message(_)) => {}
                Err(RecvError::Lagged(skipped)) => log_warn!("Status listener lagged, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}
