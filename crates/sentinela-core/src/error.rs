use thiserror::Error;

/// Erros comuns da biblioteca Sentinela
#[derive(Error, Debug)]
pub enum Error {
    /// Erro de comunicação com o node de execução
    #[error("Erro de RPC: {0}")]
    RpcError(String),

    /// Erro de comunicação com o node beacon
    #[error("Erro de beacon: {0}")]
    BeaconError(String),

    /// Erro de acesso ao armazenamento durável
    #[error("Erro de armazenamento: {0}")]
    StoreError(String),

    /// Erro de decodificação de dados
    #[error("Erro de decodificação: {0}")]
    DecodeError(String),

    /// Erro de codificação de dados
    #[error("Erro de codificação: {0}")]
    EncodeError(String),

    /// Erro de validação
    #[error("Erro de validação: {0}")]
    ValidationError(String),

    /// Erro de timeout
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Recurso não encontrado
    #[error("Não encontrado: {0}")]
    NotFound(String),

    /// Estado inconsistente entre checkpoints - requer intervenção do operador
    #[error("Falha de consistência: {0}")]
    ConsistencyFault(String),

    /// Erro de configuração
    #[error("Erro de configuração: {0}")]
    ConfigError(String),

    /// Erro genérico
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Indica se o erro é transitório de infraestrutura (vale repetir)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RpcError(_)
                | Error::BeaconError(_)
                | Error::StoreError(_)
                | Error::TimeoutError(_)
        )
    }
}

/// Tipo de resultado usado em toda a biblioteca
pub type Result<T> = std::result::Result<T, Error>;
