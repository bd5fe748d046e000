use anyhow::{Context, Result};
use config::PipelineConfig;
use loader::MonthlyLoader;
use processor::{
    DataDictionary, FileComparison, Integrator, KpiEngine, collect_metrics, comparison_frame,
    month_summary, null_counts, qa_summary, qa_summary_frame,
};
use report::HtmlPage;
use std::env;
use storage::{MANIFEST_FILE, OutputStore, RunManifest};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod loader;
mod models;
mod processor;
mod report;
mod storage;

const CONFIG_PATH: &str = "src/configs/pipeline.toml";
const PREVIEW_ROWS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Quality,
    Kpi,
    Dictionary,
    Compare,
}

impl Stage {
    const ALL: [Stage; 4] = [Stage::Quality, Stage::Kpi, Stage::Dictionary, Stage::Compare];

    fn flag(&self) -> &'static str {
        match self {
            Stage::Quality => "--quality",
            Stage::Kpi => "--kpi",
            Stage::Dictionary => "--dictionary",
            Stage::Compare => "--compare",
        }
    }

    fn name(&self) -> &'static str {
        self.flag().trim_start_matches('-')
    }
}

/// Stages requested on the command line, in pipeline order. No flag runs them all.
fn selected_stages(args: &[String]) -> Vec<Stage> {
    let picked: Vec<Stage> = Stage::ALL
        .iter()
        .copied()
        .filter(|stage| args.iter().any(|arg| arg == stage.flag()))
        .collect();

    if picked.is_empty() {
        Stage::ALL.to_vec()
    } else {
        picked
    }
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!("❌ Pipeline failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let stages = selected_stages(&args);

    info!("🚀 Starting inventory pipeline ({} stages)", stages.len());

    let config = PipelineConfig::from_file_or_default(CONFIG_PATH)
        .context("Failed to load pipeline configuration")?;
    info!(
        "Loaded configuration: {} monthly sources from '{}', output to '{}'",
        config.input.sources.len(),
        config.input.dir.display(),
        config.output.dir.display()
    );

    let mut store = OutputStore::new(&config.output.dir);
    store.ensure_dir()?;

    let mut manifest = RunManifest::start();
    for stage in &stages {
        info!("\n=== Stage: {} ===", stage.name());
        match stage {
            Stage::Quality => run_quality_stage(&config, &mut store)?,
            Stage::Kpi => run_kpi_stage(&config, &mut store)?,
            Stage::Dictionary => run_dictionary_stage(&config, &mut store)?,
            Stage::Compare => run_comparison_stage(&config, &mut store)?,
        }
        manifest.record_stage(stage.name());
    }

    let mut outputs = store.written().to_vec();
    outputs.push(store.path(MANIFEST_FILE));
    manifest.finish(&outputs);
    store.store_text(MANIFEST_FILE, &manifest.to_json()?)?;

    info!("🎉 Run {} completed. Created:", manifest.run_id);
    for path in store.written() {
        info!(" - {}", path.display());
    }

    Ok(())
}

fn dataset_file(config: &PipelineConfig, extension: &str) -> String {
    format!("{}.{}", config.output.dataset, extension)
}

fn run_quality_stage(config: &PipelineConfig, store: &mut OutputStore) -> Result<()> {
    let tables = MonthlyLoader::new()
        .load_all(&config.source_paths())
        .context("Failed to load monthly exports")?;

    let integration = Integrator::new().integrate(&tables)?;
    let mut clean = integration.clean;

    let before = collect_metrics(&integration.raw, "before")?;
    let after = collect_metrics(&clean, "after")?;
    let mut qa = qa_summary_frame(&qa_summary(&before, &after))?;

    store.store_parquet(&dataset_file(config, "parquet"), &mut clean)?;
    store.store_csv(&dataset_file(config, "csv"), &mut clean)?;
    store.store_csv(&config.output.qa_summary, &mut qa)?;

    let mut page = HtmlPage::new("Data Cleaning & QA Summary");
    page.info(&format!("Righe finali nel dataset integrato: {}", clean.height()))
        .heading("Distribuzione per mese (righe e codici unici)");
    page.table(&month_summary(&clean)?, None)?
        .heading("QA Summary (prima/dopo)");
    page.table(&qa, None)?
        .heading("Null per colonna (post-cleaning)");
    page.table(&null_counts(&clean)?, None)?
        .heading(&format!("Esempio dati finali (prime {} righe)", PREVIEW_ROWS));
    page.table(&clean, Some(PREVIEW_ROWS))?;

    store.store_text(&config.output.quality_html, &page.render())?;
    Ok(())
}

fn run_kpi_stage(config: &PipelineConfig, store: &mut OutputStore) -> Result<()> {
    let dataset = store.load_parquet(&dataset_file(config, "parquet"))?;
    let report = KpiEngine::new().compute(&dataset)?;

    let mut turnover = report.turnover_frame()?;
    let mut dio = report.dio_frame()?;
    let mut stock_levels = report.stock_level_frame()?;
    let mut rotation = report.rotation_frame()?;
    let mut items = report.items_frame()?;

    store.store_csv("kpi_turnover.csv", &mut turnover)?;
    store.store_csv("kpi_dio.csv", &mut dio)?;
    store.store_csv("kpi_over_understock.csv", &mut stock_levels)?;
    store.store_csv("kpi_rotazione_classi.csv", &mut rotation)?;
    store.store_csv("kpi_items.csv", &mut items)?;

    let mut page = HtmlPage::new("KPI logistici");
    page.info(&format!(
        "Rotazione media annualizzata: {:.2} - DIO medio: {:.0} giorni",
        report.period_turnover, report.average_dio
    ))
    .heading("Indice di rotazione (annualizzato)");
    page.table(&turnover, None)?.heading("DIO per mese");
    page.table(&dio, None)?.heading("Overstock / Sottoscorta");
    page.table(&stock_levels, None)?.heading("Classi di rotazione");
    page.table(&rotation, None)?
        .footer(&format!("Fonte dati: {}", config.dataset_parquet().display()));

    store.store_text("kpi_report.html", &page.render())?;
    Ok(())
}

fn run_dictionary_stage(config: &PipelineConfig, store: &mut OutputStore) -> Result<()> {
    let dataset = store.load_parquet(&dataset_file(config, "parquet"))?;
    let dictionary = DataDictionary::build(&dataset)?;

    let mut frame = dictionary.to_frame()?;
    let source = config.dataset_parquet().display().to_string();

    store.store_csv("Data_Dictionary.csv", &mut frame)?;
    store.store_text("Data_Dictionary.html", &dictionary.to_html(&source)?)?;
    store.store_text("Data_Dictionary.md", &dictionary.to_markdown())?;
    Ok(())
}

fn run_comparison_stage(config: &PipelineConfig, store: &mut OutputStore) -> Result<()> {
    let rows = FileComparison::new().run(config.input.raw_dir.as_deref(), &config.input.dir)?;
    let mut frame = comparison_frame(&rows)?;
    store.store_csv("confronto_pre_post.csv", &mut frame)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputSection, MonthlySource, OutputSection};
    use crate::models::Month;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn args(flags: &[&str]) -> Vec<String> {
        flags.iter().map(|f| f.to_string()).collect()
    }

    fn write_inputs(dir: &Path) -> PipelineConfig {
        let input = dir.join("dati_puliti");
        fs::create_dir_all(&input).unwrap();
        fs::write(
            input.join("gennaio.csv"),
            "Codice,Descrizione,UM,Giacenza,Reale,Scaricare\n\
             ab1,vite,pagina,-5,10,3\n\
             ab1,vite,pagina,-5,10,3\n\
             cd2,dado,pz,4,4,1\n",
        )
        .unwrap();
        fs::write(
            input.join("febbraio.csv"),
            "item_code,Description,unit_of_measure,stock_quantity,real_stock,ship_outgoing\n\
             ab1,vite,kg,6,6,2\n",
        )
        .unwrap();

        PipelineConfig {
            input: InputSection {
                dir: input,
                raw_dir: None,
                sources: vec![
                    MonthlySource {
                        file: "gennaio.csv".to_string(),
                        month: Month::Gennaio,
                    },
                    MonthlySource {
                        file: "febbraio.csv".to_string(),
                        month: Month::Febbraio,
                    },
                ],
            },
            output: OutputSection {
                dir: dir.join("ETL_QA"),
                dataset: "dataset_finale_ETL_QA".to_string(),
                qa_summary: "QA_summary.csv".to_string(),
                quality_html: "data_quality_report.html".to_string(),
            },
        }
    }

    #[test]
    fn test_stage_selection() {
        assert_eq!(selected_stages(&args(&[])), Stage::ALL.to_vec());
        assert_eq!(
            selected_stages(&args(&["--kpi", "--quality"])),
            vec![Stage::Quality, Stage::Kpi]
        );
        assert_eq!(selected_stages(&args(&["--unknown"])), Stage::ALL.to_vec());
        assert_eq!(Stage::Dictionary.name(), "dictionary");
    }

    #[test]
    fn test_all_stages_write_outputs() {
        let tmp = TempDir::new().unwrap();
        let config = write_inputs(tmp.path());
        let mut store = OutputStore::new(&config.output.dir);
        store.ensure_dir().unwrap();

        run_quality_stage(&config, &mut store).unwrap();
        run_kpi_stage(&config, &mut store).unwrap();
        run_dictionary_stage(&config, &mut store).unwrap();
        run_comparison_stage(&config, &mut store).unwrap();

        let out = &config.output.dir;
        for name in [
            "dataset_finale_ETL_QA.parquet",
            "dataset_finale_ETL_QA.csv",
            "QA_summary.csv",
            "data_quality_report.html",
            "kpi_turnover.csv",
            "kpi_dio.csv",
            "kpi_over_understock.csv",
            "kpi_rotazione_classi.csv",
            "kpi_items.csv",
            "kpi_report.html",
            "Data_Dictionary.csv",
            "Data_Dictionary.html",
            "Data_Dictionary.md",
            "confronto_pre_post.csv",
        ] {
            assert!(out.join(name).is_file(), "missing {}", name);
        }
        assert_eq!(store.written().len(), 14);

        let dataset = store.load_parquet("dataset_finale_ETL_QA.parquet").unwrap();
        assert_eq!(dataset.height(), 3);

        let qa = fs::read_to_string(out.join("QA_summary.csv")).unwrap();
        assert!(qa.starts_with("metric,before,after,delta\n"));
        assert!(qa.contains("dups,1,0,-1"));
        assert!(qa.contains("rows,4,3,-1"));

        let html = fs::read_to_string(out.join("data_quality_report.html")).unwrap();
        assert!(html.contains("Righe finali nel dataset integrato: 3"));
        assert!(html.contains("Data Cleaning &amp; QA Summary"));

        let turnover = fs::read_to_string(out.join("kpi_turnover.csv")).unwrap();
        assert!(turnover.starts_with("mese_rif,turnover_m,turnover_annuo\n"));
        assert!(turnover.contains("GENNAIO"));
        assert!(turnover.contains("FEBBRAIO"));
    }

    #[test]
    fn test_missing_input_aborts_before_writing() {
        let tmp = TempDir::new().unwrap();
        let mut config = write_inputs(tmp.path());
        config.input.sources.push(MonthlySource {
            file: "aprile.csv".to_string(),
            month: Month::Aprile,
        });
        let mut store = OutputStore::new(&config.output.dir);
        store.ensure_dir().unwrap();

        let err = run_quality_stage(&config, &mut store).unwrap_err();
        assert!(format!("{:#}", err).contains("aprile.csv"));
        assert!(store.written().is_empty());
    }
}
