//! Post-processing of the bundled text: banner, identifier rewrite, formatting.

use std::sync::Arc;

use futures::StreamExt;
use log::debug;

use crate::bundler::BundleStream;
use crate::error::BuildResult;
use crate::format::{CodeFormatter, FormatOptions};
use crate::rewrite::BundleRewrite;

/// Drains `stream` into `banner + "\n"` followed by every chunk in order.
/// The first error item aborts.
pub async fn drain(banner: &str, mut stream: BundleStream) -> BuildResult<String> {
    let mut code = String::with_capacity(banner.len() + 1);
    code.push_str(banner);
    code.push('\n');
    let mut chunks = 0usize;
    while let Some(chunk) = stream.next().await {
        code.push_str(&chunk?);
        chunks += 1;
    }
    debug!("Drained {chunks} bundle chunks ({} bytes)", code.len());
    Ok(code)
}

#[derive(Clone)]
pub struct PostProcessor {
    rewrite: Arc<dyn BundleRewrite>,
    formatter: Arc<dyn CodeFormatter>,
    options: FormatOptions,
}

impl PostProcessor {
    pub fn new(rewrite: Arc<dyn BundleRewrite>, formatter: Arc<dyn CodeFormatter>) -> Self {
        Self {
            rewrite,
            formatter,
            options: FormatOptions::bundle(),
        }
    }

    /// Produces the final artifact text. Minified bundles skip formatting.
    pub async fn process(
        &self,
        banner: &str,
        stream: BundleStream,
        minified: bool,
    ) -> BuildResult<String> {
        let code = drain(banner, stream).await?;
        let code = self.rewrite.rewrite(&code)?;
        if minified {
            debug!("Skipping formatting of minified bundle");
            return Ok(code);
        }
        Ok(self.formatter.format(&code, &self.options)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildError, BundleError, FormatError};
    use crate::rewrite::Derequire;
    use futures::stream;

    struct Marker;

    impl CodeFormatter for Marker {
        fn format(&self, code: &str, options: &FormatOptions) -> Result<String, FormatError> {
            assert_eq!(*options, FormatOptions::bundle());
            Ok(format!("{code}/* formatted */"))
        }
    }

    fn chunks(items: &[&str]) -> BundleStream {
        stream::iter(
            items
                .iter()
                .map(|s| Ok(s.to_string()))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    fn processor() -> PostProcessor {
        PostProcessor::new(Arc::new(Derequire::default()), Arc::new(Marker))
    }

    #[tokio::test]
    async fn test_drain_preserves_order() {
        let code = drain("/*! banner */", chunks(&["A", "B", "C"])).await.unwrap();
        assert_eq!(code, "/*! banner */\nABC");
    }

    #[tokio::test]
    async fn test_drain_stops_at_error() {
        let stream = stream::iter(vec![
            Ok("A".to_string()),
            Err(BundleError::Worker("boom".to_string())),
            Ok("C".to_string()),
        ])
        .boxed();
        let err = drain("b", stream).await.unwrap_err();
        assert!(matches!(err, BuildError::Bundle(BundleError::Worker(_))));
    }

    #[tokio::test]
    async fn test_formats_unless_minified() {
        let formatted = processor()
            .process("b", chunks(&["x"]), false)
            .await
            .unwrap();
        assert_eq!(formatted, "b\nx/* formatted */");

        let minified = processor()
            .process("b", chunks(&["x"]), true)
            .await
            .unwrap();
        assert_eq!(minified, "b\nx");
    }

    #[tokio::test]
    async fn test_rewrites_before_formatting() {
        let code = processor()
            .process(
                "b",
                chunks(&["({1:[function(require,module,exports){require('./a')},{}]})"]),
                true,
            )
            .await
            .unwrap();
        assert_eq!(
            code,
            "b\n({1:[function(_dereq_,module,exports){_dereq_('./a')},{}]})"
        );
    }
}
