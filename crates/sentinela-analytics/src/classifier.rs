/*!
 * Classificador offline: função pura de um vetor fixo de atributos para o
 * rótulo {-1, 0, 1}. O artefato é treinado fora do pipeline e carregado uma
 * vez na inicialização.
 */

use sentinela_core::{Error, error::Result};
use serde::Deserialize;
use std::path::Path;

/// Número de colunas do vetor de atributos do modelo
pub const FEATURE_COUNT: usize = 13;

/// Função de predição carregada na inicialização
pub trait Classifier: Send + Sync {
    /// Um rótulo em {-1, 0, 1} por linha de atributos
    fn predict(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<i8>;
}

/// Artefato serializado de um modelo linear multiclasse
#[derive(Debug, Clone, Deserialize)]
pub struct LinearClassifierArtifact {
    pub classes: Vec<i8>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

/// Modelo linear multiclasse: argmax das pontuações por classe
pub struct LinearClassifier {
    artifact: LinearClassifierArtifact,
}

impl LinearClassifier {
    pub fn from_artifact(artifact: LinearClassifierArtifact) -> Result<Self> {
        if artifact.classes.is_empty()
            || artifact.classes.len() != artifact.coefficients.len()
            || artifact.classes.len() != artifact.intercepts.len()
        {
            return Err(Error::ValidationError(
                "Artefato do classificador com dimensões inconsistentes".to_string(),
            ));
        }
        for row in &artifact.coefficients {
            if row.len() != FEATURE_COUNT {
                return Err(Error::ValidationError(format!(
                    "Coeficientes com {} colunas, esperado {}",
                    row.len(),
                    FEATURE_COUNT
                )));
            }
        }
        Ok(Self { artifact })
    }

    /// Carrega o artefato JSON gravado pelo treinamento offline
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Falha ao ler modelo {}: {}", path.display(), e))
        })?;
        let artifact: LinearClassifierArtifact = serde_json::from_str(&content)
            .map_err(|e| Error::DecodeError(format!("Modelo inválido: {}", e)))?;
        Self::from_artifact(artifact)
    }
}

impl Classifier for LinearClassifier {
    fn predict(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<i8> {
        rows.iter()
            .map(|row| {
                let mut best = (0usize, f64::NEG_INFINITY);
                for (i, (coefficients, intercept)) in self
                    .artifact
                    .coefficients
                    .iter()
                    .zip(&self.artifact.intercepts)
                    .enumerate()
                {
                    let score: f64 = coefficients
                        .iter()
                        .zip(row.iter())
                        .map(|(c, x)| c * x)
                        .sum::<f64>()
                        + intercept;
                    if score > best.1 {
                        best = (i, score);
                    }
                }
                self.artifact.classes[best.0]
            })
            .collect()
    }
}
