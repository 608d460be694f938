//! Trade-Recap — reconciliation and performance server for the signal feed
//!
//! Usage:
//!   trade-recap serve --port 3002        — Launch the JSON API server
//!   trade-recap report                   — Print the performance report
//!   trade-recap report --symbol VNM      — Per-symbol report

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use engine::{
    rank_buy_signals, reconcile_trades, summarize, summarize_sell_events, FeedClient, PairStatus,
    PriceSource, RetryPolicy, StaticPriceTable, TradePair,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "trade-recap")]
#[command(about = "Trade reconciliation and performance server", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the JSON API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3002)]
        port: u16,
    },
    /// Print a performance report to stdout (no web server)
    Report {
        /// Restrict the report to one symbol
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[derive(Clone)]
struct AppState {
    feed: Arc<FeedClient>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,trade_recap=debug")
    } else {
        EnvFilter::new("info,engine=info,trade_recap=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

/// Upstream feed base URL, e.g. https://api.example.com
fn feed_base_url() -> anyhow::Result<String> {
    std::env::var("TRADE_API_BASE")
        .map(|s| s.trim_end_matches('/').to_string())
        .map_err(|_| anyhow::anyhow!("TRADE_API_BASE is not set"))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port).await?;
        }
        Commands::Report { symbol } => {
            cmd_report(symbol).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Serve command — Axum web server
// ============================================================================

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("Trade-Recap v{} starting...", APP_VERSION);

    let base_url = feed_base_url()?;
    info!("Feed API: {}", base_url);

    let state = AppState {
        feed: Arc::new(FeedClient::new(base_url)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/recommendations", get(api_recommendations))
        .route("/history", get(api_history))
        .route("/symbol/:symbol", get(api_symbol))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new("dist"))
        .layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Trade-Recap v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health           - Health check");
    println!("  GET  /api/recommendations  - Ranked buy signals");
    println!("  GET  /api/history          - Reconciled pairs + summary");
    println!("  GET  /api/symbol/:symbol   - Per-symbol pairs + summary");
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "trade-recap",
        "version": APP_VERSION,
    }))
}

/// Query params for the recommendations endpoint
#[derive(Deserialize)]
struct RecommendationParams {
    limit: Option<usize>,
}

/// GET /api/recommendations — latest buy signals, newest and strongest first
async fn api_recommendations(
    State(state): State<AppState>,
    Query(params): Query<RecommendationParams>,
) -> Json<serde_json::Value> {
    match state.feed.get_latest_buys().await {
        Ok(events) => {
            let mut data = rank_buy_signals(events);
            if let Some(limit) = params.limit {
                data.truncate(limit);
            }
            Json(serde_json::json!({
                "success": true,
                "total": data.len(),
                "data": data,
            }))
        }
        Err(e) => {
            error!("Failed to fetch latest buys: {}", e);
            Json(serde_json::json!({
                "success": false,
                "error": format!("Failed to fetch latest buys: {}", e),
                "data": [],
                "total": 0,
            }))
        }
    }
}

/// GET /api/history — full reconciliation with live valuation of open positions
async fn api_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let events = match state.feed.get_trade_history().await {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to fetch trade history: {}", e);
            return Json(serde_json::json!({
                "success": false,
                "error": format!("Failed to fetch trade history: {}", e),
            }));
        }
    };

    let prices: Arc<dyn PriceSource> = state.feed.clone();
    let pairs = reconcile_trades(&events, today(), prices, RetryPolicy::default()).await;
    let summary = summarize(&pairs);
    let rows: Vec<serde_json::Value> = pairs.iter().map(pair_row).collect();

    Json(serde_json::json!({
        "success": true,
        "summary": summary,
        "pairs": rows,
    }))
}

/// GET /api/symbol/:symbol — pairs valued against the payload's own price
/// series; the summary is computed from the raw sell events
async fn api_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<serde_json::Value> {
    let details = match state.feed.get_symbol_details(&symbol).await {
        Ok(details) => details,
        Err(e) => {
            error!(symbol, "Failed to fetch symbol details: {}", e);
            return Json(serde_json::json!({
                "success": false,
                "error": format!("Failed to fetch symbol details: {}", e),
            }));
        }
    };

    let mut table = StaticPriceTable::new();
    if let Some(price) = details.latest_adj_close() {
        table.insert(symbol.as_str(), price);
    }

    let pairs = reconcile_trades(&details.trades, today(), Arc::new(table), RetryPolicy::default()).await;
    let summary = summarize_sell_events(&details.trades);
    let rows: Vec<serde_json::Value> = pairs.iter().map(pair_row).collect();

    Json(serde_json::json!({
        "success": true,
        "symbol": symbol,
        "summary": summary,
        "pairs": rows,
    }))
}

// ============================================================================
// Display formatting
// ============================================================================

fn format_day(day: NaiveDate) -> String {
    day.format("%d/%m/%Y").to_string()
}

fn format_price(price: Option<Decimal>) -> String {
    price
        .map(|p| format!("{:.2}", p))
        .unwrap_or_else(|| "_".to_string())
}

fn date_range(pair: &TradePair) -> String {
    match pair.sell_date {
        Some(sell) => format!("{} - {}", format_day(pair.buy_date), format_day(sell)),
        None => format_day(pair.buy_date),
    }
}

fn price_range(pair: &TradePair) -> String {
    match pair.sell_date {
        Some(_) => format!(
            "{} - {}",
            format_price(pair.buy_price),
            format_price(pair.sell_price)
        ),
        None => format_price(pair.buy_price),
    }
}

/// One display row per pair: formatted ranges plus the raw return fraction
fn pair_row(pair: &TradePair) -> serde_json::Value {
    serde_json::json!({
        "symbol": pair.symbol,
        "dateRange": date_range(pair),
        "priceRange": price_range(pair),
        "returnPct": pair.return_pct,
        "daysHeld": pair.days_held,
        "status": pair.status,
    })
}

// ============================================================================
// Report command — CLI mode (no web server)
// ============================================================================

async fn cmd_report(symbol: Option<String>) -> anyhow::Result<()> {
    println!("\n=== Trade-Recap v{} ===", APP_VERSION);

    let base_url = feed_base_url()?;
    let feed = Arc::new(FeedClient::new(base_url));

    let (pairs, summary) = match &symbol {
        Some(symbol) => {
            let details = feed.get_symbol_details(symbol).await?;
            let mut table = StaticPriceTable::new();
            if let Some(price) = details.latest_adj_close() {
                table.insert(symbol.as_str(), price);
            }
            let pairs =
                reconcile_trades(&details.trades, today(), Arc::new(table), RetryPolicy::default())
                    .await;
            let summary = summarize_sell_events(&details.trades);
            (pairs, summary)
        }
        None => {
            let events = feed.get_trade_history().await?;
            let prices: Arc<dyn PriceSource> = feed.clone();
            let pairs = reconcile_trades(&events, today(), prices, RetryPolicy::default()).await;
            let summary = summarize(&pairs);
            (pairs, summary)
        }
    };

    match &symbol {
        Some(symbol) => println!("Symbol: {}", symbol),
        None => println!("All symbols"),
    }

    println!(
        "\nTrades: {} | Win rate: {:.1}% | Avg return: {:+.2}%",
        summary.total_trades, summary.win_rate, summary.avg_return_pct
    );
    println!(
        "Avg win: {:+.2}% | Avg loss: {:+.2}% | Max win: {:+.2}% | Max loss: {:+.2}%",
        summary.avg_win_pct, summary.avg_loss_pct, summary.max_win_pct, summary.max_loss_pct
    );
    println!(
        "Avg holding: {:.1} days | Sharpe: {:.2}",
        summary.avg_holding_days, summary.sharpe_ratio
    );

    if pairs.is_empty() {
        println!("\nNo trade pairs.");
        return Ok(());
    }

    println!("\nTrade Pairs:");
    println!(
        "  {:>3}  {:<8} {:<25} {:<17} {:>9} {:>6}  {}",
        "#", "Symbol", "Dates", "Prices", "Return%", "Days", "Status"
    );
    println!("  {}", "-".repeat(78));
    for (i, pair) in pairs.iter().enumerate() {
        let ret = pair
            .return_pct
            .map(|r| format!("{:+.2}", r * 100.0))
            .unwrap_or_else(|| "_".to_string());
        let status = match pair.status {
            PairStatus::Holding => "holding",
            PairStatus::Completed => "completed",
        };
        println!(
            "  {:>3}  {:<8} {:<25} {:<17} {:>9} {:>6}  {}",
            i + 1,
            pair.symbol,
            date_range(pair),
            price_range(pair),
            ret,
            pair.days_held,
            status
        );
    }

    Ok(())
}
