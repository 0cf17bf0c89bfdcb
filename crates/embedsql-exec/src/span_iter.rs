use embedsql_core::{PlanResult, Row, RowIter};
use tracing::Span;

/// A transparent wrapper opening one tracing span per iterator, entered for
/// the duration of every `next`/`close` call and finished once the inner
/// iterator reports end of stream or `close` runs, whichever comes first.
pub struct SpanRowIter {
    inner: Box<dyn RowIter>,
    span: Span,
    finished: bool,
}

impl SpanRowIter {
    pub fn wrap(inner: Box<dyn RowIter>, label: &'static str) -> Box<dyn RowIter> {
        Box::new(SpanRowIter {
            inner,
            span: tracing::debug_span!("row_iter", node = label),
            finished: false,
        })
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            let _enter = self.span.enter();
            tracing::trace!("iterator finished");
        }
    }
}

impl RowIter for SpanRowIter {
    fn next(&mut self) -> PlanResult<Option<Row>> {
        let result = {
            let _enter = self.span.enter();
            self.inner.next()
        };
        match &result {
            Ok(None) | Err(_) => self.finish(),
            Ok(Some(_)) => {}
        }
        result
    }

    fn close(&mut self) -> PlanResult<()> {
        let result = {
            let _enter = self.span.enter();
            self.inner.close()
        };
        self.finish();
        result
    }
}
