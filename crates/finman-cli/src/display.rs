//! Record history output.

use anyhow::Context;
use arrow::array::{Array, BooleanArray, Float64Array};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;

#[derive(Debug, Default, PartialEq)]
pub struct Totals {
    pub spent: f64,
    pub received: f64,
    pub rows: usize,
}

/// Sum `price` over the batches, split by `is_income`.
pub fn totals(batches: &[RecordBatch]) -> anyhow::Result<Totals> {
    let mut totals = Totals::default();
    for batch in batches {
        let price = batch
            .column_by_name("price")
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .context("price column missing or not f64")?;
        let income = batch
            .column_by_name("is_income")
            .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
            .context("is_income column missing or not bool")?;
        for i in 0..batch.num_rows() {
            if price.is_null(i) {
                continue;
            }
            if !income.is_null(i) && income.value(i) {
                totals.received += price.value(i);
            } else {
                totals.spent += price.value(i);
            }
        }
        totals.rows += batch.num_rows();
    }
    Ok(totals)
}

/// Print records as a table followed by a spent/received summary.
pub fn print_history(batches: &[RecordBatch]) -> anyhow::Result<()> {
    let totals = totals(batches)?;
    if totals.rows == 0 {
        println!("No records yet.");
        return Ok(());
    }
    println!("{}", pretty_format_batches(batches)?);
    println!(
        "{} records  spent ₹{:.2}  received ₹{:.2}",
        totals.rows, totals.spent, totals.received
    );
    Ok(())
}
