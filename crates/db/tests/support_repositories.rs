use rust_decimal::Decimal;

use telassist_core::domain::query::CustomerId;
use telassist_core::lookup::{AccountLookup, KnowledgeSearch, NetworkStatusLookup};
use telassist_db::repositories::{
    SqlAccountRepository, SqlKnowledgeRepository, SqlNetworkStatusRepository,
};
use telassist_db::{connect_with_settings, migrations, DbPool, SupportSeedDataset};

type TestResult = Result<(), String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

async fn seeded_pool() -> Result<DbPool, String> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    SupportSeedDataset::load(&pool).await.map_err(|error| format!("seed: {error}"))?;
    Ok(pool)
}

#[tokio::test]
async fn account_snapshot_reads_seeded_customer() -> TestResult {
    let pool = seeded_pool().await?;
    let repo = SqlAccountRepository::new(pool);

    let snapshot = repo
        .snapshot(&CustomerId::new("CUST001"), 3)
        .await
        .map_err(|error| error.to_string())?
        .ok_or("CUST001 should exist")?;

    require!(snapshot.account.name == "Test User");
    let plan = snapshot.plan.ok_or("plan should resolve")?;
    require!(plan.plan_id == "PLAN_BASIC");
    require!(plan.monthly_cost == Decimal::new(29_900, 2), "cost was {}", plan.monthly_cost);
    require!(plan.data_limit_gb == Some(Decimal::new(10, 0)));

    let contract = snapshot.contract.ok_or("contract terms should resolve")?;
    require!(contract.term_months == 12);
    require!(contract.early_termination_fee == Decimal::new(15_000, 2));

    require!(snapshot.usage.len() == 2, "usage rows: {}", snapshot.usage.len());
    require!(snapshot.usage[0].billing_period_start == "2025-11-01");
    require!(snapshot.usage[0].total_bill_amount == Decimal::new(39_900, 2));
    require!(snapshot.usage[0].additional_charges == Decimal::new(5_000, 2));
    require!(snapshot.usage[0].data_used_gb == Decimal::new(125, 1));
    Ok(())
}

#[tokio::test]
async fn unknown_customer_has_no_snapshot() -> TestResult {
    let repo = SqlAccountRepository::new(seeded_pool().await?);
    let snapshot =
        repo.snapshot(&CustomerId::new("CUST404"), 3).await.map_err(|error| error.to_string())?;
    require!(snapshot.is_none());
    Ok(())
}

#[tokio::test]
async fn plans_are_listed_cheapest_first() -> TestResult {
    let repo = SqlAccountRepository::new(seeded_pool().await?);
    let plans = repo.list_plans().await.map_err(|error| error.to_string())?;
    let ids: Vec<&str> = plans.iter().map(|plan| plan.plan_id.as_str()).collect();
    require!(ids == ["PLAN_BASIC", "PLAN_STANDARD", "PLAN_FAMILY"], "order was {ids:?}");
    Ok(())
}

#[tokio::test]
async fn network_status_matches_area_case_insensitively() -> TestResult {
    let repo = SqlNetworkStatusRepository::new(seeded_pool().await?);

    let exact = repo.incidents_for_area("mumbai west").await.map_err(|error| error.to_string())?;
    require!(exact.len() == 1);
    require!(exact[0].status == "Outage");
    require!(exact[0].details.as_deref() == Some("Localized antenna maintenance affecting voice calls"));

    let partial = repo.incidents_for_area("Mumbai").await.map_err(|error| error.to_string())?;
    require!(partial.iter().any(|incident| incident.area == "Mumbai West"));

    let none = repo.incidents_for_area("Chennai").await.map_err(|error| error.to_string())?;
    require!(none.is_empty());

    let blank = repo.incidents_for_area("  ").await.map_err(|error| error.to_string())?;
    require!(blank.is_empty());

    let areas = repo.known_areas().await.map_err(|error| error.to_string())?;
    require!(areas.len() == 3, "areas: {areas:?}");
    Ok(())
}

#[tokio::test]
async fn knowledge_search_ranks_seeded_passages() -> TestResult {
    let repo = SqlKnowledgeRepository::new(seeded_pool().await?);

    let volte = repo.search("How to enable VoLTE on Samsung?", 3).await.map_err(|e| e.to_string())?;
    require!(!volte.is_empty());
    require!(volte[0].topic.as_deref() == Some("VoLTE on Samsung"), "top was {:?}", volte[0].topic);
    require!(volte.len() <= 3);
    require!(volte.windows(2).all(|pair| pair[0].score >= pair[1].score));

    let apn = repo.search("APN settings", 1).await.map_err(|e| e.to_string())?;
    require!(apn.len() == 1);
    require!(apn[0].document == "device_guides.md");

    let nothing = repo.search("zzzz qqqq", 3).await.map_err(|e| e.to_string())?;
    require!(nothing.is_empty());
    Ok(())
}
