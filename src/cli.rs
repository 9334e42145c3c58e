//! Interface de linha de comando do assetwatch baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (summarize, config)
//! e flags globais (--config, --concurrency, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::summary::AssetType;

/// assetwatch: resumos de risco de ativos digitais, gerados e validados por LLM.
#[derive(Debug, Parser)]
#[command(name = "assetwatch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./assetwatch.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Sobrescreve o número de jobs processados em paralelo.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Tipo de ativo aceito pela CLI, mapeado para [`AssetType`] internamente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AssetTypeArg {
    /// Certificado/endpoint web.
    Web,
    /// Host com portas e serviços expostos.
    Host,
}

impl From<AssetTypeArg> for AssetType {
    fn from(arg: AssetTypeArg) -> Self {
        match arg {
            AssetTypeArg::Web => AssetType::Web,
            AssetTypeArg::Host => AssetType::Host,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Gera e grava um resumo para cada arquivo JSON de ativo.
    Summarize {
        /// Arquivos JSON de ativos; cada um precisa de um campo "id".
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = AssetTypeArg::Web)]
        asset_type: AssetTypeArg,

        /// Diretório de saída (sobrescreve `output_dir` da configuração).
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Mostra a configuração efetiva, com a chave da API mascarada.
    Config,
}
