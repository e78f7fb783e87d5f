//! Trial-record schema shared by ingestion and analysis.
//!
//! Column names are case-sensitive and must match what the upstream
//! experiment front-end submits. Both the CSV appender in `ingest` and
//! the cleaner in `analysis::cleaner` read them from here.

/// Participant identifier column.
pub const PARTICIPANT: &str = "participant";
/// Experimental condition column.
pub const CONDITION: &str = "condition";
/// Test type column.
pub const TEST_TYPE: &str = "testType";
/// 1-based trial number column.
pub const TRIAL_NUMBER: &str = "trialNumber";
/// Layout identifier column.
pub const LAYOUT_ID: &str = "layoutId";
/// Layout type column ("repeated" / "random").
pub const LAYOUT_TYPE: &str = "layoutType";
/// Trial result column ("Correct" / "Incorrect").
pub const RESULT: &str = "result";
/// Response time column, in milliseconds.
pub const RESPONSE_TIME: &str = "responseTime";

/// Header written by the appender, in file order.
pub const CANONICAL_COLUMNS: [&str; 8] = [
    PARTICIPANT,
    CONDITION,
    TEST_TYPE,
    TRIAL_NUMBER,
    LAYOUT_ID,
    LAYOUT_TYPE,
    RESULT,
    RESPONSE_TIME,
];

/// Columns the analysis cannot run without, in the order they are checked.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    PARTICIPANT,
    LAYOUT_TYPE,
    RESULT,
    RESPONSE_TIME,
    TRIAL_NUMBER,
];

/// Output column names of the aggregate artifact.
pub const AGGREGATE_COLUMNS: [&str; 4] = [PARTICIPANT, LAYOUT_TYPE, "Table", "MeanResponseTime"];

/// Output column names of the ANOVA artifact.
pub const ANOVA_COLUMNS: [&str; 5] = ["source", "sum_sq", "df", "F", "PR(>F)"];

/// Block of a trial: `((trial - 1) div trials_per_block) + 1`.
pub fn block_of(trial_number: u32, trials_per_block: u32) -> u32 {
    (trial_number.saturating_sub(1) / trials_per_block.max(1)) + 1
}

/// Table of a block: `((block - 1) div blocks_per_table) + 1`.
pub fn table_of(block: u32, blocks_per_table: u32) -> u32 {
    (block.saturating_sub(1) / blocks_per_table.max(1)) + 1
}

/// Block and table of a trial.
pub fn grouping_of(trial_number: u32, trials_per_block: u32, blocks_per_table: u32) -> (u32, u32) {
    let block = block_of(trial_number, trials_per_block);
    (block, table_of(block, blocks_per_table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_boundaries() {
        for t in 1..=20 {
            assert_eq!(block_of(t, 20), 1);
        }
        for t in 21..=40 {
            assert_eq!(block_of(t, 20), 2);
        }
        assert_eq!(block_of(41, 20), 3);
    }

    #[test]
    fn test_table_boundaries() {
        for b in 1..=3 {
            assert_eq!(table_of(b, 3), 1);
        }
        for b in 4..=6 {
            assert_eq!(table_of(b, 3), 2);
        }
    }

    #[test]
    fn test_grouping_matches_ceiling_formula() {
        for t in 1..=400u32 {
            let block = (t + 19) / 20;
            let table = (block + 2) / 3;
            assert_eq!(grouping_of(t, 20, 3), (block, table));
        }
    }

    #[test]
    fn test_required_columns_are_canonical() {
        for column in REQUIRED_COLUMNS {
            assert!(CANONICAL_COLUMNS.contains(&column));
        }
    }
}
