use indicatif::ProgressStyle;

const LABEL_WIDTH: usize = 32;

/// Extension trait for creating progress bar styles with a fixed-width label.
pub trait NamedProgress {
    /// Creates a progress bar style labelled with `name`.
    fn named_bar(name: &str) -> Self;
}

impl NamedProgress for ProgressStyle {
    fn named_bar(name: &str) -> Self {
        let template = format!(
            "{:<width$}{{wide_bar:40.cyan/blue}} {{pos:>7}}/{{len:<7}} [{{elapsed_precise}} ({{eta}} remaining)] {{msg}}",
            name,
            width = LABEL_WIDTH
        );
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or(ProgressStyle::default_bar())
    }
}
