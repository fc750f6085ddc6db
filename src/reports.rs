//! Fixed analytical reports.
//!
//! Each report is a read-only join over the kennel tables. The caller picks
//! one of the report's named sort keys and a direction; the key resolves to a
//! fixed result column, so no user text ever reaches the `ORDER BY` clause.

use crate::db::Session;
use crate::error::DbResult;
use crate::models::{ResultSet, SortDirection, Statement};
use clap::ValueEnum;
use tracing::info;

/// The three reports offered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    /// Breeding-pair candidates
    Breeding,
    /// Elite breeding pairs (both dogs hold a medal)
    Elite,
    /// Service-dog candidates
    Service,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [Self::Breeding, Self::Elite, Self::Service];

    /// The query template behind this report.
    pub fn template(&self) -> &'static ReportTemplate {
        match self {
            Self::Breeding => &BREEDING,
            Self::Elite => &ELITE,
            Self::Service => &SERVICE,
        }
    }

    /// Parse a report name as typed at the console.
    pub fn parse(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name.trim(), true).ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Breeding => "breeding",
            Self::Elite => "elite",
            Self::Service => "service",
        }
    }
}

/// A named sort option of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Short name used on the command line (`total`, `male-score`, ...)
    pub name: &'static str,
    /// Menu label
    pub label: &'static str,
    /// Result column the key orders by
    pub column: &'static str,
}

#[derive(Debug)]
pub struct ReportTemplate {
    pub kind: ReportKind,
    pub title: &'static str,
    pub description: &'static str,
    /// Result column labels, in select-list order.
    pub columns: &'static [&'static str],
    /// Sort menu; the first entry is the default.
    pub sort_keys: &'static [SortKey],
    base_sql: &'static str,
}

impl ReportTemplate {
    /// Resolve a sort key by name, label or column. Unknown or missing keys
    /// fall back to the first key of the menu.
    pub fn sort_key(&self, requested: Option<&str>) -> &SortKey {
        let requested = requested.map(str::trim).filter(|r| !r.is_empty());
        requested
            .and_then(|r| {
                self.sort_keys.iter().find(|k| {
                    k.name.eq_ignore_ascii_case(r)
                        || k.label.eq_ignore_ascii_case(r)
                        || k.column.eq_ignore_ascii_case(r)
                })
            })
            .unwrap_or(&self.sort_keys[0])
    }

    /// The report query with its `ORDER BY` suffix appended.
    pub fn statement(&self, sort_key: Option<&str>, direction: SortDirection) -> Statement {
        let key = self.sort_key(sort_key);
        Statement::new(format!(
            "{} ORDER BY {} {}",
            self.base_sql.trim_end(),
            key.column,
            direction.as_sql()
        ))
    }
}

/// A materialized report, ready to render or export.
#[derive(Debug, Clone)]
pub struct Report {
    pub kind: ReportKind,
    pub title: &'static str,
    pub description: &'static str,
    pub sort_key: SortKey,
    pub direction: SortDirection,
    pub result: ResultSet,
}

impl Report {
    /// Summary line shown above the grid.
    pub fn header(&self) -> String {
        format!("Found {} records", self.result.row_count())
    }
}

/// Run a report with the chosen sort key and direction.
pub async fn run_report(
    session: &Session,
    kind: ReportKind,
    sort_key: Option<&str>,
    direction: SortDirection,
) -> DbResult<Report> {
    let template = kind.template();
    let key = *template.sort_key(sort_key);
    let statement = template.statement(Some(key.name), direction);

    let mut result = session.fetch(&statement).await?;
    if result.columns.is_empty() {
        result.columns = template.columns.iter().map(|c| c.to_string()).collect();
    }

    info!(
        report = kind.name(),
        sort = key.column,
        direction = direction.as_sql(),
        rows = result.row_count(),
        "Report generated"
    );

    Ok(Report {
        kind,
        title: template.title,
        description: template.description,
        sort_key: key,
        direction,
        result,
    })
}

// =============================================================================
// Report Templates
// =============================================================================

const PAIR_SORT_BASE: [SortKey; 3] = [
    SortKey {
        name: "total",
        label: "By total score",
        column: "total_score",
    },
    SortKey {
        name: "male-score",
        label: "By male score",
        column: "male_score",
    },
    SortKey {
        name: "female-score",
        label: "By female score",
        column: "female_score",
    },
];

static BREEDING: ReportTemplate = ReportTemplate {
    kind: ReportKind::Breeding,
    title: "Breeding pairs",
    description: "Selection criteria:\n\
        - Same breed, one male and one female, both alive\n\
        - Score of each parent >= 4",
    columns: &[
        "male_id",
        "female_id",
        "male_owner",
        "female_owner",
        "male_breed",
        "female_breed",
        "male_score",
        "female_score",
        "total_score",
    ],
    sort_keys: &[
        PAIR_SORT_BASE[0],
        PAIR_SORT_BASE[1],
        PAIR_SORT_BASE[2],
        SortKey {
            name: "male-breed",
            label: "By male breed",
            column: "male_breed",
        },
        SortKey {
            name: "female-breed",
            label: "By female breed",
            column: "female_breed",
        },
    ],
    base_sql: r#"
        SELECT
            m.id_dog AS male_id,
            f.id_dog AS female_id,
            m.owner AS male_owner,
            f.owner AS female_owner,
            bm.name AS male_breed,
            bf.name AS female_breed,
            m.assesment AS male_score,
            f.assesment AS female_score,
            (m.assesment + f.assesment) AS total_score
        FROM Dogs m
        JOIN Dogs f ON m.id_breed = f.id_breed
            AND m.gender = 'M'
            AND f.gender = 'F'
            AND m.id_dog != f.id_dog
        JOIN Breeds bm ON m.id_breed = bm.id_breed
        JOIN Breeds bf ON f.id_breed = bf.id_breed
        WHERE m.alive = TRUE AND f.alive = TRUE
            AND m.assesment >= 4 AND f.assesment >= 4
        "#,
};

static ELITE: ReportTemplate = ReportTemplate {
    kind: ReportKind::Elite,
    title: "Elite breeding pairs",
    description: "Selection criteria:\n\
        - Same breed, one male and one female, both alive\n\
        - Score of each parent >= 4\n\
        - At least one medal for each parent",
    columns: &[
        "male_id",
        "female_id",
        "male_owner",
        "female_owner",
        "male_breed",
        "female_breed",
        "male_score",
        "female_score",
        "male_medals",
        "female_medals",
        "total_score",
    ],
    sort_keys: &[
        PAIR_SORT_BASE[0],
        PAIR_SORT_BASE[1],
        PAIR_SORT_BASE[2],
        SortKey {
            name: "male-medals",
            label: "By male medals",
            column: "male_medals",
        },
        SortKey {
            name: "female-medals",
            label: "By female medals",
            column: "female_medals",
        },
    ],
    base_sql: r#"
        SELECT
            m.id_dog AS male_id,
            f.id_dog AS female_id,
            m.owner AS male_owner,
            f.owner AS female_owner,
            bm.name AS male_breed,
            bf.name AS female_breed,
            m.assesment AS male_score,
            f.assesment AS female_score,
            (SELECT COUNT(*) FROM Exhibitions WHERE id_dog = m.id_dog AND medal IS NOT NULL) AS male_medals,
            (SELECT COUNT(*) FROM Exhibitions WHERE id_dog = f.id_dog AND medal IS NOT NULL) AS female_medals,
            (m.assesment + f.assesment) AS total_score
        FROM Dogs m
        JOIN Dogs f ON m.id_breed = f.id_breed
            AND m.gender = 'M'
            AND f.gender = 'F'
            AND m.id_dog != f.id_dog
        JOIN Breeds bm ON m.id_breed = bm.id_breed
        JOIN Breeds bf ON f.id_breed = bf.id_breed
        WHERE m.alive = TRUE AND f.alive = TRUE
            AND m.assesment >= 4 AND f.assesment >= 4
            AND EXISTS (SELECT 1 FROM Exhibitions WHERE id_dog = m.id_dog AND medal IS NOT NULL)
            AND EXISTS (SELECT 1 FROM Exhibitions WHERE id_dog = f.id_dog AND medal IS NOT NULL)
        "#,
};

static SERVICE: ReportTemplate = ReportTemplate {
    kind: ReportKind::Service,
    title: "Service dogs",
    description: "Selection criteria:\n\
        - Psyche test = 5\n\
        - Alive dogs only",
    columns: &[
        "dog_id",
        "owner",
        "score",
        "psyche_test",
        "breed",
        "characteristic",
    ],
    sort_keys: &[
        SortKey {
            name: "score",
            label: "By dog score",
            column: "score",
        },
        SortKey {
            name: "psyche-test",
            label: "By psyche test",
            column: "psyche_test",
        },
        SortKey {
            name: "breed",
            label: "By breed",
            column: "breed",
        },
        SortKey {
            name: "owner",
            label: "By owner",
            column: "owner",
        },
    ],
    base_sql: r#"
        SELECT
            d.id_dog AS dog_id,
            d.owner AS owner,
            d.assesment AS score,
            d.psyche_test AS psyche_test,
            b.name AS breed,
            b.characteristic AS characteristic
        FROM Dogs d
        JOIN Breeds b ON d.id_breed = b.id_breed
        WHERE d.alive = TRUE
            AND d.psyche_test = 5
        "#,
};
