use console::{Term, style};
use harvester::HarvestReport;
use harvester::harvest::format_top;
use sea_orm::{DatabaseConnection, DbErr};

/// Open the store, creating the schema when migrations are compiled in.
pub(crate) async fn open_database(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    #[cfg(feature = "migrate")]
    {
        harvester::connect_and_migrate(database_url).await
    }
    #[cfg(not(feature = "migrate"))]
    {
        harvester::connect(database_url).await
    }
}

/// Lines of the end-of-run summary.
pub(crate) fn summary_lines(report: &HarvestReport) -> Vec<String> {
    let mut lines = vec![
        format!("Index total:      {}", report.total),
        format!("Names discovered: {}", report.discovered),
        format!("Records fetched:  {}", report.fetched),
        format!("Rows saved:       {}", report.saved),
        format!("Elapsed:          {:.1}s", report.elapsed.as_secs_f64()),
    ];
    if !report.failed_pages.is_empty() {
        let pages: Vec<String> = report.failed_pages.iter().map(u32::to_string).collect();
        lines.push(format!("Pages lost:       {}", pages.join(", ")));
    }
    if report.failed_details > 0 {
        lines.push(format!("Fetch failures:   {}", report.failed_details));
    }
    lines
}

/// Print the run summary, or log it when stdout is not a terminal.
pub(crate) fn display_report(report: &HarvestReport) {
    if !Term::stdout().is_term() {
        // The library already logs the summary and ranking.
        return;
    }

    println!();
    if report.cancelled {
        println!("{}", style("Run interrupted; partial results were saved.").yellow());
    }
    for line in summary_lines(report) {
        println!("{line}");
    }

    if !report.top.is_empty() {
        println!();
        println!("{}", style(format!("Top {} by stars:", report.top.len())).bold());
        for line in format_top(&report.top) {
            println!("  {line}");
        }
    }
}
