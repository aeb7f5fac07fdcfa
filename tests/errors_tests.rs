use promoguard::errors::{PromoGuardError, Result};
use std::error::Error;

#[cfg(test)]
mod error_creation_tests {
    use super::*;

    #[test]
    fn test_database_connection_error() {
        let error = PromoGuardError::database_connection("connection refused");

        assert!(matches!(error, PromoGuardError::DatabaseConnection(_)));
        assert!(error.to_string().contains("Database Connection Error"));
        assert!(error.to_string().contains("connection refused"));
    }

    #[test]
    fn test_queue_error() {
        let error = PromoGuardError::queue("batch too large");

        assert!(matches!(error, PromoGuardError::Queue(_)));
        assert_eq!(error.code(), "E008");
        assert!(error.to_string().contains("Queue Error"));
    }

    #[test]
    fn test_settlement_error() {
        let error = PromoGuardError::settlement("ledger write failed");

        assert!(matches!(error, PromoGuardError::Settlement(_)));
        assert_eq!(error.code(), "E010");
        assert_eq!(error.message(), "ledger write failed");
    }

    #[test]
    fn test_codes_are_unique() {
        let errors = [
            PromoGuardError::config("x"),
            PromoGuardError::database_config("x"),
            PromoGuardError::database_connection("x"),
            PromoGuardError::database_operation("x"),
            PromoGuardError::validation("x"),
            PromoGuardError::not_found("x"),
            PromoGuardError::serialization("x"),
            PromoGuardError::queue("x"),
            PromoGuardError::platform("x"),
            PromoGuardError::settlement("x"),
            PromoGuardError::date_parse("x"),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}

#[cfg(test)]
mod error_conversion_tests {
    use super::*;

    #[test]
    fn test_db_error_conversion() {
        let db_error = sea_orm::DbErr::RecordNotFound("promotion_posts".to_string());
        let error: PromoGuardError = db_error.into();

        assert!(matches!(error, PromoGuardError::DatabaseOperation(_)));
        assert!(error.message().contains("promotion_posts"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let error: PromoGuardError = json_error.into();

        assert!(matches!(error, PromoGuardError::Serialization(_)));
        assert!(error.to_string().contains("Serialization Error"));
    }

    #[test]
    fn test_chrono_parse_error_conversion() {
        let parse_error = chrono::NaiveDate::parse_from_str("yesterday", "%Y-%m-%d").unwrap_err();
        let error: PromoGuardError = parse_error.into();

        assert!(matches!(error, PromoGuardError::DateParse(_)));
        assert_eq!(error.code(), "E011");
    }

    #[test]
    fn test_question_mark_propagation() {
        fn parse(input: &str) -> Result<serde_json::Value> {
            Ok(serde_json::from_str(input)?)
        }
        assert!(parse("{\"views\": 1}").is_ok());
        assert!(matches!(
            parse("views"),
            Err(PromoGuardError::Serialization(_))
        ));
    }
}

#[cfg(test)]
mod error_trait_tests {
    use super::*;

    #[test]
    fn test_error_trait_implementation() {
        let error = PromoGuardError::validation("bad date");

        let error_trait: &dyn Error = &error;
        assert!(!error_trait.to_string().is_empty());
        assert!(error_trait.source().is_none());
    }

    #[test]
    fn test_debug_implementation() {
        let error = PromoGuardError::database_connection("connection refused");
        let debug_string = format!("{:?}", error);

        assert!(debug_string.contains("DatabaseConnection"));
        assert!(debug_string.contains("connection refused"));
    }

    #[test]
    fn test_colored_format_carries_code_and_message() {
        colored::control::set_override(false);
        let error = PromoGuardError::platform("tiktok adapter missing");
        let formatted = error.format_colored();

        assert!(formatted.contains("[ERROR]"));
        assert!(formatted.contains("E009"));
        assert!(formatted.contains("tiktok adapter missing"));
    }

    #[test]
    fn test_anyhow_downcast() {
        let err: anyhow::Error = PromoGuardError::not_found("post-1").into();
        let err = err.context("Post settlement failed");
        let inner = err.downcast_ref::<PromoGuardError>().unwrap();
        assert_eq!(inner.code(), "E006");
    }
}
