//! Human and machine readable renderings of a [`BenchReport`].

use std::fmt::Write;

use crate::config::OutputFormat;
use crate::results::{BenchReport, RunReport, TotalResults};

/// Renders `report` in the requested format.
///
/// `quiet` drops the per-client blocks from the text output; JSON always
/// carries every run.
pub fn render(
    report: &BenchReport,
    format: OutputFormat,
    quiet: bool,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(render_text(report, quiet)),
        OutputFormat::Json => render_json(report),
    }
}

pub fn render_json(report: &BenchReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

pub fn render_text(report: &BenchReport, quiet: bool) -> String {
    let mut out = String::new();
    if !quiet {
        for run in &report.runs {
            write_run(&mut out, run);
        }
    }
    write_totals(&mut out, &report.totals, report.runs.len());
    out
}

// Writing into a String cannot fail.
fn write_run(out: &mut String, report: &RunReport) {
    let run = &report.run;
    let _ = writeln!(out, "======= CLIENT {} =======", run.id);
    let _ = writeln!(
        out,
        "Ratio:               {:.3} ({}/{})",
        run.ratio(),
        run.successes,
        run.total()
    );
    let _ = writeln!(out, "Runtime (s):         {:.3}", run.run_time);
    let _ = writeln!(out, "Msg time min (us):   {:.3}", run.msg_time_min);
    let _ = writeln!(out, "Msg time max (us):   {:.3}", run.msg_time_max);
    let _ = writeln!(out, "Msg time mean (us):  {:.3}", run.msg_time_mean);
    let _ = writeln!(out, "Msg time std (us):   {:.3}", run.msg_time_std);
    let _ = writeln!(out, "Received:            {}", report.msg_del_count);
    let _ = writeln!(out, "Delivery min (us):   {:.3}", report.msg_del_time_min);
    let _ = writeln!(out, "Delivery max (us):   {:.3}", report.msg_del_time_max);
    let _ = writeln!(out, "Delivery mean (us):  {:.3}", report.msg_del_time_mean);
    let _ = writeln!(out, "Delivery std (us):   {:.3}", report.msg_del_time_std);
    let _ = writeln!(out, "Bandwidth (msg/sec): {:.3}", run.msgs_per_sec);
    let _ = writeln!(out);
}

fn write_totals(out: &mut String, totals: &TotalResults, clients: usize) {
    let _ = writeln!(out, "========= TOTAL ({clients}) =========");
    let _ = writeln!(
        out,
        "Total Ratio:                 {:.3} ({}/{})",
        totals.ratio,
        totals.successes,
        totals.successes + totals.failures
    );
    let _ = writeln!(out, "Total Runtime (sec):         {:.3}", totals.total_run_time);
    let _ = writeln!(out, "Average Runtime (sec):       {:.3}", totals.avg_run_time);
    let _ = writeln!(out, "Msg time min (us):           {:.3}", totals.msg_time_min);
    let _ = writeln!(out, "Msg time max (us):           {:.3}", totals.msg_time_max);
    let _ = writeln!(out, "Msg time mean mean (us):     {:.3}", totals.msg_time_mean_avg);
    let _ = writeln!(out, "Msg time mean std (us):      {:.3}", totals.msg_time_mean_std);
    let _ = writeln!(out, "Received:                    {}", totals.received);
    let _ = writeln!(out, "Delivery min (us):           {:.3}", totals.msg_del_time_min);
    let _ = writeln!(out, "Delivery max (us):           {:.3}", totals.msg_del_time_max);
    let _ = writeln!(out, "Delivery mean mean (us):     {:.3}", totals.msg_del_time_mean_avg);
    let _ = writeln!(out, "Delivery mean std (us):      {:.3}", totals.msg_del_time_mean_std);
    let _ = writeln!(out, "Average Bandwidth (msg/sec): {:.3}", totals.avg_msgs_per_sec);
    let _ = writeln!(out, "Total Bandwidth (msg/sec):   {:.3}", totals.total_msgs_per_sec);
}

#[cfg(test)]
mod tests;
