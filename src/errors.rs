use std::fmt;

#[derive(Debug, Clone)]
pub enum PromoGuardError {
    Config(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    Validation(String),
    NotFound(String),
    Serialization(String),
    Queue(String),
    Platform(String),
    Settlement(String),
    DateParse(String),
}

impl PromoGuardError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            PromoGuardError::Config(_) => "E001",
            PromoGuardError::DatabaseConfig(_) => "E002",
            PromoGuardError::DatabaseConnection(_) => "E003",
            PromoGuardError::DatabaseOperation(_) => "E004",
            PromoGuardError::Validation(_) => "E005",
            PromoGuardError::NotFound(_) => "E006",
            PromoGuardError::Serialization(_) => "E007",
            PromoGuardError::Queue(_) => "E008",
            PromoGuardError::Platform(_) => "E009",
            PromoGuardError::Settlement(_) => "E010",
            PromoGuardError::DateParse(_) => "E011",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            PromoGuardError::Config(_) => "Configuration Error",
            PromoGuardError::DatabaseConfig(_) => "Database Configuration Error",
            PromoGuardError::DatabaseConnection(_) => "Database Connection Error",
            PromoGuardError::DatabaseOperation(_) => "Database Operation Error",
            PromoGuardError::Validation(_) => "Validation Error",
            PromoGuardError::NotFound(_) => "Resource Not Found",
            PromoGuardError::Serialization(_) => "Serialization Error",
            PromoGuardError::Queue(_) => "Queue Error",
            PromoGuardError::Platform(_) => "Platform Adapter Error",
            PromoGuardError::Settlement(_) => "Settlement Error",
            PromoGuardError::DateParse(_) => "Date Parse Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            PromoGuardError::Config(msg)
            | PromoGuardError::DatabaseConfig(msg)
            | PromoGuardError::DatabaseConnection(msg)
            | PromoGuardError::DatabaseOperation(msg)
            | PromoGuardError::Validation(msg)
            | PromoGuardError::NotFound(msg)
            | PromoGuardError::Serialization(msg)
            | PromoGuardError::Queue(msg)
            | PromoGuardError::Platform(msg)
            | PromoGuardError::Settlement(msg)
            | PromoGuardError::DateParse(msg) => msg,
        }
    }

    /// 格式化为彩色输出（用于终端）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于日志）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for PromoGuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for PromoGuardError {}

// 便捷的构造函数
impl PromoGuardError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::Config(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::DatabaseOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::NotFound(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::Serialization(msg.into())
    }

    pub fn queue<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::Queue(msg.into())
    }

    pub fn platform<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::Platform(msg.into())
    }

    pub fn settlement<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::Settlement(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        PromoGuardError::DateParse(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for PromoGuardError {
    fn from(err: sea_orm::DbErr) -> Self {
        PromoGuardError::DatabaseOperation(err.to_string())
    }
}

impl From<serde_json::Error> for PromoGuardError {
    fn from(err: serde_json::Error) -> Self {
        PromoGuardError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for PromoGuardError {
    fn from(err: chrono::ParseError) -> Self {
        PromoGuardError::DateParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PromoGuardError>;
