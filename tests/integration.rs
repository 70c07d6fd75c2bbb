//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! Integration tests for the query bridge.
//!
//! Uses a small inline CSV (~20 rows) to exercise ingestion, the plan
//! pipeline (filter/group/sort/head), filter accumulation policy,
//! aggregate decomposition, zero-copy column access, and error paths.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use teidedb::{col, types, ColumnData, Context, Error, SymIndices, Table};

// The C engine uses global state — serialize all tests.
static ENGINE_LOCK: Mutex<()> = Mutex::new(());

// ---------------------------------------------------------------------------
// Test data helpers
// ---------------------------------------------------------------------------

const CSV_HEADER: &str = "id1,id2,id3,id4,id5,id6,v1,v2,v3";
const CSV_ROWS: &[&str] = &[
    "id001,id001,id0000000001,1,10,100,1,2,1.5",
    "id001,id001,id0000000002,2,20,200,2,3,2.5",
    "id001,id002,id0000000003,3,30,300,3,4,3.5",
    "id001,id002,id0000000004,1,10,100,4,5,4.5",
    "id002,id001,id0000000005,2,20,200,5,6,5.5",
    "id002,id001,id0000000006,3,30,300,6,7,6.5",
    "id002,id002,id0000000007,1,10,100,7,8,7.5",
    "id002,id002,id0000000008,2,20,200,8,9,8.5",
    "id003,id001,id0000000009,3,30,300,9,10,9.5",
    "id003,id001,id0000000010,1,10,100,10,11,10.5",
    "id003,id002,id0000000011,2,20,200,1,2,11.5",
    "id003,id002,id0000000012,3,30,300,2,3,12.5",
    "id004,id001,id0000000013,1,10,100,3,4,1.5",
    "id004,id001,id0000000014,2,20,200,4,5,2.5",
    "id004,id002,id0000000015,3,30,300,5,6,3.5",
    "id004,id002,id0000000016,1,10,100,6,7,4.5",
    "id005,id001,id0000000017,2,20,200,7,8,5.5",
    "id005,id001,id0000000018,3,30,300,8,9,6.5",
    "id005,id002,id0000000019,1,10,100,9,10,7.5",
    "id005,id002,id0000000020,2,20,200,10,11,8.5",
];

fn create_test_csv() -> (tempfile::NamedTempFile, String) {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(f, "{CSV_HEADER}").unwrap();
    for row in CSV_ROWS {
        writeln!(f, "{row}").unwrap();
    }
    f.flush().unwrap();
    let path = f.path().to_str().unwrap().to_string();
    (f, path)
}

/// Collect column 0 (string) → column 1 (i64) into a map.
fn collect_str_i64(table: &Table) -> HashMap<String, i64> {
    let mut map = HashMap::new();
    for row in 0..table.nrows().unwrap() as usize {
        let key = table.get_str(0, row).unwrap();
        let val = table.get_i64(1, row).unwrap();
        map.insert(key, val);
    }
    map
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[test]
fn csv_read() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    assert_eq!(table.nrows().unwrap(), 20);
    assert_eq!(table.ncols().unwrap(), 9);

    let names = table.column_names().unwrap();
    assert_eq!(names[0], "id1");
    assert_eq!(names[6], "v1");
    assert_eq!(names[8], "v3");

    // id1-id3 are SYM, id4-id6/v1-v2 are I64, v3 is F64
    assert_eq!(table.col("id1").unwrap().dtype(), types::SYM);
    assert_eq!(table.col("v1").unwrap().dtype(), types::I64);
    assert_eq!(table.col("v3").unwrap().dtype(), types::F64);
    assert_eq!(table.col("v3").unwrap().dtype_str(), "f64");

    ctx.destroy();
}

#[tokio::test]
async fn csv_read_async() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv(&path).await.unwrap();

    assert_eq!(table.nrows().unwrap(), 20);
    assert_eq!(table.ncols().unwrap(), 9);

    ctx.destroy();
}

#[test]
fn csv_read_opts_delimiter() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(f, "a;b").unwrap();
    writeln!(f, "1;2.5").unwrap();
    writeln!(f, "3;4.5").unwrap();
    f.flush().unwrap();
    let path = f.path().to_str().unwrap().to_string();

    let mut ctx = Context::new().unwrap();
    let opts = teidedb::CsvOptions {
        delimiter: ';',
        ..Default::default()
    };
    let table = ctx.read_csv_opts_sync(&path, &opts).unwrap();
    assert_eq!(table.nrows().unwrap(), 2);
    assert_eq!(table.ncols().unwrap(), 2);
    assert_eq!(table.get_i64(0, 1), Some(3));

    ctx.destroy();
}

// ---------------------------------------------------------------------------
// Plan pipeline
// ---------------------------------------------------------------------------

#[test]
fn filter_collect() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    // v1 values > 3: 4,5,6,7,8,9,10 appear twice each = 14 rows.
    // The 3.0 literal routes to integer emission against the I64 column.
    let result = table.filter(col("v1").gt(3.0)).collect_sync().unwrap();
    assert_eq!(result.nrows().unwrap(), 14);
    assert_eq!(result.ncols().unwrap(), 9);

    ctx.destroy();
}

#[test]
fn leading_filters_accumulate_conjunctively() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    // v1 in (2, 5) exclusive → {3, 4} twice each = 4 rows. Were only the
    // last filter applied, v1 < 5 would leave 8 rows and head(5) would
    // return 5.
    let result = table
        .filter(col("v1").gt(2.0))
        .filter(col("v1").lt(5.0))
        .head(5)
        .collect_sync()
        .unwrap();
    assert_eq!(result.nrows().unwrap(), 4);
    for row in 0..4 {
        let v = result.get_i64(6, row).unwrap();
        assert!((3..=4).contains(&v), "unexpected v1: {v}");
    }

    ctx.destroy();
}

#[test]
fn group_by_sum() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let result = table
        .group_by(["id1"])
        .agg([col("v1").sum()])
        .collect_sync()
        .unwrap();

    assert_eq!(result.nrows().unwrap(), 5);
    assert_eq!(result.ncols().unwrap(), 2);

    let sums = collect_str_i64(&result);
    assert_eq!(sums["id001"], 10);
    assert_eq!(sums["id002"], 26);
    assert_eq!(sums["id003"], 22);
    assert_eq!(sums["id004"], 18);
    assert_eq!(sums["id005"], 34);

    ctx.destroy();
}

#[test]
fn bare_column_in_aggregate_list_takes_first_value() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let result = table
        .group_by(["id1"])
        .agg([col("v1").sum(), col("id2")])
        .collect_sync()
        .unwrap();

    assert_eq!(result.nrows().unwrap(), 5);
    assert_eq!(result.ncols().unwrap(), 3);

    // Every id1 group starts with an id2 of "id001" in the fixture.
    for row in 0..5 {
        assert_eq!(result.get_str(2, row).unwrap(), "id001");
    }

    ctx.destroy();
}

#[test]
fn filter_before_group_installs_selection() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let result = table
        .filter(col("v1").gt(3.0))
        .group_by(["id1"])
        .agg([col("v1").sum()])
        .collect_sync()
        .unwrap();

    let sums = collect_str_i64(&result);
    assert_eq!(sums["id001"], 4);
    assert_eq!(sums["id002"], 26);
    assert_eq!(sums["id003"], 19);
    assert_eq!(sums["id004"], 15);
    assert_eq!(sums["id005"], 34);

    ctx.destroy();
}

#[test]
fn sort_ascending_and_descending() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let asc = table.sort("v3", false).collect_sync().unwrap();
    assert_eq!(asc.nrows().unwrap(), 20);
    assert_eq!(asc.get_f64(8, 0).unwrap(), 1.5);

    let desc = table.sort("v3", true).collect_sync().unwrap();
    assert_eq!(desc.get_f64(8, 0).unwrap(), 12.5);

    ctx.destroy();
}

#[test]
fn filter_then_sort_applies_pending_filter() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let result = table
        .filter(col("v1").ge(5.0))
        .sort("v1", true)
        .collect_sync()
        .unwrap();

    // v1 >= 5: {5..10} twice each = 12 rows, descending from 10.
    assert_eq!(result.nrows().unwrap(), 12);
    assert_eq!(result.get_i64(6, 0).unwrap(), 10);
    assert_eq!(result.get_i64(6, 11).unwrap(), 5);

    ctx.destroy();
}

#[test]
fn head_limits_rows() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let result = table.head(5).collect_sync().unwrap();
    assert_eq!(result.nrows().unwrap(), 5);
    assert_eq!(result.ncols().unwrap(), 9);

    ctx.destroy();
}

#[test]
fn arithmetic_in_predicate() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    // v2 = v1 + 1, so v1 + v2 > 15 ⇔ v1 >= 8 → {8, 9, 10} twice = 6 rows.
    let result = table
        .filter(col("v1").add(col("v2")).gt(15.0))
        .collect_sync()
        .unwrap();
    assert_eq!(result.nrows().unwrap(), 6);

    ctx.destroy();
}

#[test]
fn empty_plan_returns_table() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let result = table.query().collect_sync().unwrap();
    assert_eq!(result.nrows().unwrap(), 20);
    assert_eq!(result.ncols().unwrap(), 9);

    ctx.destroy();
}

#[tokio::test]
async fn collect_async() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv(&path).await.unwrap();

    let result = table.filter(col("v1").gt(3.0)).collect().await.unwrap();
    assert_eq!(result.nrows().unwrap(), 14);

    ctx.destroy();
}

// ---------------------------------------------------------------------------
// Zero-copy column access
// ---------------------------------------------------------------------------

#[test]
fn zero_copy_f64_data() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let v3 = table.col("v3").unwrap();
    assert_eq!(v3.len().unwrap(), 20);
    match v3.data().unwrap() {
        ColumnData::F64(values) => {
            assert_eq!(values.len(), 20);
            assert_eq!(values[0], 1.5);
            assert_eq!(values[19], 8.5);
        }
        other => panic!("expected F64 view, got {other:?}"),
    }
    // The view is cached: a second request is the same slice.
    match v3.data().unwrap() {
        ColumnData::F64(values) => assert_eq!(values.len(), 20),
        other => panic!("expected F64 view, got {other:?}"),
    }

    ctx.destroy();
}

#[test]
fn zero_copy_i64_data() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let v1 = table.col("v1").unwrap();
    match v1.data().unwrap() {
        ColumnData::I64(values) => {
            assert_eq!(values.len(), 20);
            assert_eq!(values[0], 1);
            assert_eq!(values[9], 10);
        }
        other => panic!("expected I64 view, got {other:?}"),
    }

    ctx.destroy();
}

#[test]
fn symbol_column_access() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let id1 = table.col("id1").unwrap();
    assert_eq!(id1.dtype_str(), "sym");

    // Raw data is refused on symbol columns.
    assert!(matches!(id1.data(), Err(Error::SymbolColumnData)));

    // Few distinct symbols → 8-bit indices.
    match id1.indices().unwrap() {
        SymIndices::W8(idx) => assert_eq!(idx.len(), 20),
        other => panic!("expected 8-bit indices, got {other:?}"),
    }

    let dict = id1.dictionary().unwrap();
    for name in ["id001", "id002", "id003", "id004", "id005"] {
        assert!(
            dict.iter().any(|s| s == name),
            "dictionary is missing {name}"
        );
    }

    ctx.destroy();
}

#[test]
fn null_bitmap_absent_without_nulls() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let v1 = table.col("v1").unwrap();
    assert!(v1.null_bitmap().unwrap().is_none());

    ctx.destroy();
}

#[test]
fn indices_on_numeric_column_is_an_error() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let v1 = table.col("v1").unwrap();
    assert!(matches!(v1.indices(), Err(Error::NotSymbolColumn)));
    assert!(matches!(v1.dictionary(), Err(Error::NotSymbolColumn)));

    ctx.destroy();
}

// ---------------------------------------------------------------------------
// Error paths
// ---------------------------------------------------------------------------

#[test]
fn unknown_column_in_plan_sync() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let err = table
        .filter(col("does_not_exist").gt(1.0))
        .collect_sync()
        .err()
        .unwrap();
    assert!(err.to_string().contains("does_not_exist"));

    ctx.destroy();
}

#[tokio::test]
async fn unknown_column_in_plan_async() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv(&path).await.unwrap();

    let err = table
        .filter(col("does_not_exist").gt(1.0))
        .collect()
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("does_not_exist"));

    // Group keys and sort columns are validated the same way.
    let err = table
        .group_by(["missing_key"])
        .agg([col("v1").sum()])
        .collect()
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("missing_key"));

    ctx.destroy();
}

#[test]
fn unknown_column_lookup() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    match table.col("does_not_exist") {
        Err(Error::UnknownColumn(name)) => assert_eq!(name, "does_not_exist"),
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("lookup unexpectedly succeeded"),
    }

    ctx.destroy();
}

#[test]
fn csv_read_missing_file() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let mut ctx = Context::new().unwrap();
    let err = ctx.read_csv_sync("/nonexistent/definitely_missing.csv");
    assert!(matches!(err, Err(Error::Engine(_))));
    ctx.destroy();
}

// ---------------------------------------------------------------------------
// CSV round trip
// ---------------------------------------------------------------------------

#[test]
fn write_csv_round_trip() {
    let _guard = ENGINE_LOCK.lock().unwrap();
    let (_file, path) = create_test_csv();
    let mut ctx = Context::new().unwrap();
    let table = ctx.read_csv_sync(&path).unwrap();

    let result = table.filter(col("v1").gt(3.0)).collect_sync().unwrap();

    let out = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    let out_path = out.path().to_str().unwrap().to_string();
    result.write_csv(&out_path).unwrap();

    let back = ctx.read_csv_sync(&out_path).unwrap();
    assert_eq!(back.nrows().unwrap(), result.nrows().unwrap());
    assert_eq!(back.ncols().unwrap(), result.ncols().unwrap());

    ctx.destroy();
}
