// Integration tests for end-to-end workflows and critical pipeline scenarios

#[cfg(test)]
mod integration_tests {
    use crate::aggregate::{aggregate, GroupBy, GroupKey};
    use crate::channel::Channel;
    use crate::metric::Ratio;
    use crate::normalize::{normalize_sources, SourceTable};
    use crate::pipeline::{run, PipelineInput, PipelineParams};
    use crate::recommend::Subject;

    fn marketing_columns() -> Vec<String> {
        vec![
            " Date ".into(),
            "Campaign".into(),
            "Impression".into(),
            "Clicks".into(),
            "Spend".into(),
            "Attributed Revenue".into(),
        ]
    }

    /// Builds a single-channel table with `rows` identical rows carrying the
    /// given per-row spend.
    fn channel_table(source: &str, rows: usize, spend_per_row: f64) -> SourceTable {
        SourceTable {
            source: source.to_string(),
            columns: marketing_columns(),
            rows: (0..rows)
                .map(|i| {
                    vec![
                        format!("2024-06-{:02}", (i % 28) + 1),
                        format!("Campaign {}", i % 7),
                        "1000".to_string(),
                        "50".to_string(),
                        spend_per_row.to_string(),
                        (spend_per_row * 1.1).to_string(),
                    ]
                })
                .collect(),
        }
    }

    /// Concatenating 100/50/25-row sources with known total spends, then
    /// aggregating by channel, must reproduce those totals exactly.
    #[test]
    fn test_three_channel_concatenation_conserves_spend() {
        let sources = vec![
            (Channel::Facebook, channel_table("Facebook.csv", 100, 10.0)), // $1,000
            (Channel::Google, channel_table("Google.csv", 50, 10.0)),      // $500
            (Channel::TikTok, channel_table("TikTok.csv", 25, 10.0)),      // $250
        ];
        let (records, warnings) = normalize_sources(&sources).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(records.len(), 175);

        let by_channel = aggregate(&records, GroupBy::Channel);
        assert_eq!(by_channel.len(), 3);
        assert_eq!(by_channel[0].key, GroupKey::Channel(Channel::Facebook));
        assert_eq!(by_channel[0].spend, 1000.0);
        assert_eq!(by_channel[1].spend, 500.0);
        assert_eq!(by_channel[2].spend, 250.0);

        let grand_total: f64 = by_channel.iter().map(|a| a.spend).sum();
        assert_eq!(grand_total, 1750.0);
    }

    /// Full run over messy-headed sources: every output view is populated and
    /// the aggregates reconcile against the unified set.
    #[test]
    fn test_end_to_end_run() {
        let business = SourceTable {
            source: "Business.csv".to_string(),
            columns: vec![
                "date".into(),
                "# of orders".into(),
                "total revenue".into(),
                "gross profit".into(),
            ],
            rows: (0..28)
                .map(|i| {
                    vec![
                        format!("2024-06-{:02}", i + 1),
                        "100".to_string(),
                        "5000".to_string(),
                        "2000".to_string(),
                    ]
                })
                .collect(),
        };
        let input = PipelineInput {
            sources: vec![
                (Channel::Facebook, channel_table("Facebook.csv", 56, 40.0)),
                (Channel::Google, channel_table("Google.csv", 28, 25.0)),
            ],
            business,
        };

        let report = run(&input, &PipelineParams::default()).unwrap();

        assert_eq!(report.records.len(), 84);
        assert_eq!(report.by_date.len(), 28);
        assert_eq!(report.by_channel.len(), 2);
        assert!(report.reconciliation_warnings.is_empty());
        assert_eq!(report.combined.rows.len(), 28);
        assert_eq!(report.combined.unmatched_business_dates, 0);
        assert!(report.combined.rows.iter().all(|r| r.marketing.is_some()));
        assert!(report
            .combined
            .rows
            .iter()
            .all(|r| r.gross_margin_pct == Ratio::Defined(0.4)));

        // Per-row revenue is 1.1x spend everywhere, so every view agrees.
        let overall = report.kpis.overall_roas.value().unwrap();
        assert!((overall - 1.1).abs() < 1e-9);
        for aggregate in &report.by_channel {
            assert!((aggregate.metrics.roas.value().unwrap() - 1.1).abs() < 1e-9);
        }

        // Identical daily totals: zero variance, so the detector reports none.
        assert!(report.anomalies.is_empty());
    }

    /// A weak campaign injected next to healthy ones must surface through the
    /// whole pipeline as a pause/optimize recommendation.
    #[test]
    fn test_weak_campaign_surfaces_in_recommendations() {
        let mut weak = channel_table("Facebook.csv", 1, 1000.0);
        weak.rows[0][1] = "Money Pit".to_string();
        weak.rows[0][5] = "400".to_string(); // ROAS 0.4
        let healthy = channel_table("Google.csv", 10, 50.0);

        let input = PipelineInput {
            sources: vec![(Channel::Facebook, weak), (Channel::Google, healthy)],
            business: SourceTable {
                source: "Business.csv".to_string(),
                columns: vec!["date".into(), "total revenue".into()],
                rows: vec![vec!["2024-06-01".into(), "5000".into()]],
            },
        };
        let report = run(&input, &PipelineParams::default()).unwrap();

        assert!(report.recommendations.iter().any(|r| {
            r.subject == Subject::Campaign("Money Pit".to_string())
                && r.message.contains("pause or optimize")
        }));
    }
}
