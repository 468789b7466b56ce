use std::path::Path;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgListener, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::equation::{Equation, EquationElement, Operator};
use crate::error::DashboardResult;
use crate::filter::{Filter, FilterOp};
use crate::models::{
    Dataset, DatasetSnapshot, DisplayConfig, Donation, Event, Request, Scholarship, Widget,
};
use crate::snapshot::{ChangeEvent, SnapshotSource, Table};

pub const CHANGE_CHANNEL: &str = "dashboard_changes";

pub async fn init_db(pool: &PgPool) -> DashboardResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Reads the four collections in full, concurrently.
pub async fn fetch_snapshot(pool: &PgPool) -> DashboardResult<DatasetSnapshot> {
    let (donations, requests, scholarships, events) = tokio::try_join!(
        fetch_donations(pool),
        fetch_requests(pool),
        fetch_scholarships(pool),
        fetch_events(pool),
    )?;

    Ok(DatasetSnapshot {
        donations,
        requests,
        scholarships,
        events,
    })
}

pub struct PgSnapshotSource {
    pool: PgPool,
}

impl PgSnapshotSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SnapshotSource for PgSnapshotSource {
    async fn fetch(&self) -> DashboardResult<DatasetSnapshot> {
        fetch_snapshot(&self.pool).await
    }
}

async fn fetch_donations(pool: &PgPool) -> Result<Vec<Donation>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, title, description, category, amount_needed, weight, is_approved, \
         approval_decision_made, organization_id, created_at \
         FROM dashboard.donations ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(donation_from_row).collect()
}

async fn fetch_requests(pool: &PgPool) -> Result<Vec<Request>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, title, description, category, urgency, is_approved, \
         approval_decision_made, is_completed, organization_id, created_at \
         FROM dashboard.requests ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}

async fn fetch_scholarships(pool: &PgPool) -> Result<Vec<Scholarship>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, title, description, amount, deadline, is_approved, \
         approval_decision_made, organization_id, created_at \
         FROM dashboard.scholarships ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(scholarship_from_row).collect()
}

async fn fetch_events(pool: &PgPool) -> Result<Vec<Event>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, title, description, location, event_date, is_approved, \
         approval_decision_made, organization_id, created_at \
         FROM dashboard.events ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(event_from_row).collect()
}

fn donation_from_row(row: &PgRow) -> Result<Donation, sqlx::Error> {
    Ok(Donation {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        amount_needed: row.try_get("amount_needed")?,
        weight: row.try_get("weight")?,
        is_approved: row.try_get("is_approved")?,
        approval_decision_made: row.try_get("approval_decision_made")?,
        organization_id: row.try_get("organization_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn request_from_row(row: &PgRow) -> Result<Request, sqlx::Error> {
    Ok(Request {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        urgency: row.try_get("urgency")?,
        is_approved: row.try_get("is_approved")?,
        approval_decision_made: row.try_get("approval_decision_made")?,
        is_completed: row.try_get("is_completed")?,
        organization_id: row.try_get("organization_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn scholarship_from_row(row: &PgRow) -> Result<Scholarship, sqlx::Error> {
    Ok(Scholarship {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        amount: row.try_get("amount")?,
        deadline: row.try_get("deadline")?,
        is_approved: row.try_get("is_approved")?,
        approval_decision_made: row.try_get("approval_decision_made")?,
        organization_id: row.try_get("organization_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<Event, sqlx::Error> {
    Ok(Event {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        event_date: row.try_get("event_date")?,
        is_approved: row.try_get("is_approved")?,
        approval_decision_made: row.try_get("approval_decision_made")?,
        organization_id: row.try_get("organization_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn widget_from_row(row: &PgRow) -> Result<Widget, sqlx::Error> {
    let id: Uuid = row.try_get("id")?;
    let raw_config: serde_json::Value = row.try_get("display_config")?;
    let display_config = serde_json::from_value(raw_config).unwrap_or_else(|err| {
        warn!(widget = %id, error = %err, "unreadable display_config; using defaults");
        DisplayConfig::default()
    });

    Ok(Widget {
        id,
        title: row.try_get("title")?,
        section: row.try_get("section")?,
        position: row.try_get("position")?,
        display_config,
        is_active: row.try_get("is_active")?,
    })
}

pub async fn fetch_widgets(pool: &PgPool) -> DashboardResult<Vec<Widget>> {
    let rows = sqlx::query(
        "SELECT id, title, section, position, display_config, is_active \
         FROM dashboard.widgets ORDER BY section, position",
    )
    .fetch_all(pool)
    .await?;

    let widgets = rows
        .iter()
        .map(widget_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(widgets)
}

async fn insert_donation(pool: &PgPool, donation: &Donation) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO dashboard.donations
        (id, title, description, category, amount_needed, weight, is_approved,
         approval_decision_made, organization_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, now()))
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(record_id(donation.id))
    .bind(&donation.title)
    .bind(&donation.description)
    .bind(&donation.category)
    .bind(donation.amount_needed)
    .bind(donation.weight)
    .bind(donation.is_approved)
    .bind(donation.approval_decision_made)
    .bind(donation.organization_id)
    .bind(donation.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_request(pool: &PgPool, request: &Request) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO dashboard.requests
        (id, title, description, category, urgency, is_approved,
         approval_decision_made, is_completed, organization_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, now()))
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(record_id(request.id))
    .bind(&request.title)
    .bind(&request.description)
    .bind(&request.category)
    .bind(&request.urgency)
    .bind(request.is_approved)
    .bind(request.approval_decision_made)
    .bind(request.is_completed)
    .bind(request.organization_id)
    .bind(request.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_scholarship(pool: &PgPool, scholarship: &Scholarship) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO dashboard.scholarships
        (id, title, description, amount, deadline, is_approved,
         approval_decision_made, organization_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, now()))
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(record_id(scholarship.id))
    .bind(&scholarship.title)
    .bind(&scholarship.description)
    .bind(scholarship.amount)
    .bind(scholarship.deadline)
    .bind(scholarship.is_approved)
    .bind(scholarship.approval_decision_made)
    .bind(scholarship.organization_id)
    .bind(scholarship.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_event(pool: &PgPool, event: &Event) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO dashboard.events
        (id, title, description, location, event_date, is_approved,
         approval_decision_made, organization_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, now()))
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(record_id(event.id))
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.location)
    .bind(event.event_date)
    .bind(event.is_approved)
    .bind(event.approval_decision_made)
    .bind(event.organization_id)
    .bind(event.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn upsert_widget(pool: &PgPool, widget: &Widget) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO dashboard.widgets (id, title, section, position, display_config, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET title = EXCLUDED.title, section = EXCLUDED.section, position = EXCLUDED.position,
            display_config = EXCLUDED.display_config, is_active = EXCLUDED.is_active
        "#,
    )
    .bind(record_id(widget.id))
    .bind(&widget.title)
    .bind(&widget.section)
    .bind(widget.position)
    .bind(Json(&widget.display_config))
    .bind(widget.is_active)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Rows imported with a blank or missing id get a fresh one.
fn record_id(id: Uuid) -> Uuid {
    if id.is_nil() {
        Uuid::new_v4()
    } else {
        id
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let donations = vec![
        Donation {
            id: Uuid::parse_str("6b1f3c52-8f0e-4c3b-9a51-0d2b7f3c9e01")?,
            title: Some("Winter coats drive".to_string()),
            category: Some("Clothing".to_string()),
            amount_needed: Some(100.0),
            weight: Some(42.5),
            is_approved: Some(true),
            approval_decision_made: Some(true),
            ..Donation::default()
        },
        Donation {
            id: Uuid::parse_str("6b1f3c52-8f0e-4c3b-9a51-0d2b7f3c9e02")?,
            title: Some("Pantry restock".to_string()),
            category: Some("Food".to_string()),
            amount_needed: Some(200.0),
            weight: Some(120.0),
            is_approved: Some(false),
            approval_decision_made: Some(false),
            ..Donation::default()
        },
        Donation {
            id: Uuid::parse_str("6b1f3c52-8f0e-4c3b-9a51-0d2b7f3c9e03")?,
            title: Some("Backpacks for fall term".to_string()),
            category: Some("School Supplies".to_string()),
            amount_needed: Some(0.0),
            ..Donation::default()
        },
    ];
    for donation in &donations {
        insert_donation(pool, donation).await?;
    }

    let requests = vec![
        Request {
            id: Uuid::parse_str("a4e2d9b0-3c71-4f0a-8d6e-5b9c1f2e7a01")?,
            title: Some("Laptop for coursework".to_string()),
            category: Some("Technology".to_string()),
            urgency: Some("high".to_string()),
            is_approved: Some(true),
            approval_decision_made: Some(true),
            is_completed: Some(true),
            ..Request::default()
        },
        Request {
            id: Uuid::parse_str("a4e2d9b0-3c71-4f0a-8d6e-5b9c1f2e7a02")?,
            title: Some("Transit pass".to_string()),
            category: Some("Transportation".to_string()),
            urgency: Some("medium".to_string()),
            is_approved: Some(false),
            approval_decision_made: Some(false),
            is_completed: Some(false),
            ..Request::default()
        },
    ];
    for request in &requests {
        insert_request(pool, request).await?;
    }

    let scholarship = Scholarship {
        id: Uuid::parse_str("c7d3e1f4-9a2b-4c5d-8e6f-0a1b2c3d4e01")?,
        title: Some("First-generation STEM award".to_string()),
        amount: Some(2500.0),
        deadline: NaiveDate::from_ymd_opt(2026, 12, 1),
        is_approved: Some(true),
        approval_decision_made: Some(true),
        ..Scholarship::default()
    };
    insert_scholarship(pool, &scholarship).await?;

    let event = Event {
        id: Uuid::parse_str("e9f8a7b6-5c4d-4e3f-a2b1-c0d9e8f7a601")?,
        title: Some("Volunteer orientation".to_string()),
        location: Some("Community hall".to_string()),
        event_date: NaiveDate::from_ymd_opt(2026, 11, 14),
        ..Event::default()
    };
    insert_event(pool, &event).await?;

    let widgets = vec![
        Widget {
            id: Uuid::parse_str("0f1e2d3c-4b5a-4968-8776-655443322101")?,
            title: "Funding still needed".to_string(),
            section: "overview".to_string(),
            position: 1,
            display_config: DisplayConfig {
                equation: Equation::new(vec![
                    EquationElement::value("donations_amount"),
                    EquationElement::operator(Operator::Subtract),
                    EquationElement::filtered(
                        "donations_amount",
                        vec![Filter::new("is_approved", FilterOp::Equals, "true")],
                    ),
                ]),
                value_format: "currency".to_string(),
            },
            is_active: true,
        },
        Widget {
            id: Uuid::parse_str("0f1e2d3c-4b5a-4968-8776-655443322102")?,
            title: "Request completion rate".to_string(),
            section: "overview".to_string(),
            position: 2,
            display_config: DisplayConfig {
                equation: Equation::new(vec![
                    EquationElement::value("requests_completed"),
                    EquationElement::operator(Operator::Divide),
                    EquationElement::value("requests_count"),
                    EquationElement::operator(Operator::Multiply),
                    EquationElement::number(100.0),
                ]),
                value_format: "percentage".to_string(),
            },
            is_active: true,
        },
        Widget {
            id: Uuid::parse_str("0f1e2d3c-4b5a-4968-8776-655443322103")?,
            title: "Goods collected".to_string(),
            section: "logistics".to_string(),
            position: 1,
            display_config: DisplayConfig {
                equation: Equation::new(vec![EquationElement::value("donations_weight")]),
                value_format: "weight".to_string(),
            },
            is_active: true,
        },
    ];
    for widget in &widgets {
        upsert_widget(pool, widget).await?;
    }

    Ok(())
}

fn read_csv<T: DeserializeOwned>(csv_path: &Path) -> DashboardResult<Vec<T>> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let rows = reader.deserialize::<T>().collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Inserts every row of `csv_path` into the table backing `dataset`,
/// returning how many rows were new.
pub async fn import_csv(pool: &PgPool, dataset: Dataset, csv_path: &Path) -> DashboardResult<usize> {
    let mut inserted = 0usize;

    match dataset {
        Dataset::Donations => {
            for row in read_csv::<Donation>(csv_path)? {
                inserted += insert_donation(pool, &row).await? as usize;
            }
        }
        Dataset::Requests => {
            for row in read_csv::<Request>(csv_path)? {
                inserted += insert_request(pool, &row).await? as usize;
            }
        }
        Dataset::Scholarships => {
            for row in read_csv::<Scholarship>(csv_path)? {
                inserted += insert_scholarship(pool, &row).await? as usize;
            }
        }
        Dataset::Events => {
            for row in read_csv::<Event>(csv_path)? {
                inserted += insert_event(pool, &row).await? as usize;
            }
        }
    }

    Ok(inserted)
}

/// Relays `NOTIFY dashboard_changes` payloads onto the change bus until the
/// bus is closed.
pub async fn forward_changes(
    pool: &PgPool,
    changes: mpsc::Sender<ChangeEvent>,
) -> DashboardResult<()> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANGE_CHANNEL).await?;
    info!(channel = CHANGE_CHANNEL, "listening for table changes");

    loop {
        let notification = listener.recv().await?;
        let Some(table) = Table::parse(notification.payload()) else {
            warn!(payload = notification.payload(), "ignoring change for unknown table");
            continue;
        };
        if changes.send(ChangeEvent { table }).await.is_err() {
            return Ok(());
        }
    }
}
