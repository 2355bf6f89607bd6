//! Media player artwork.

use serde::{Deserialize, Serialize};

use hassly_api::Connection;
use hassly_api::command::GetMediaPlayerThumbnail;

use crate::cli::{GlobalOpts, ThumbnailArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// `media_player_thumbnail` result; `content` is base64.
#[derive(Debug, Serialize, Deserialize)]
struct Thumbnail {
    content_type: String,
    content: String,
}

impl Thumbnail {
    /// Decoded size, from the base64 length and padding.
    fn decoded_len(&self) -> usize {
        let padding = self.content.bytes().rev().take_while(|b| *b == b'=').count();
        (self.content.len() / 4 * 3).saturating_sub(padding)
    }
}

pub async fn handle(
    conn: &Connection,
    args: ThumbnailArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let thumb: Thumbnail =
        util::fetch(conn, GetMediaPlayerThumbnail::new(args.entity_id.as_str()), global).await?;

    let out = output::render_single(
        &global.output,
        &thumb,
        |t| {
            output::detail_block(&[
                ("Entity", args.entity_id.clone()),
                ("Content type", t.content_type.clone()),
                ("Size", format!("{} bytes", t.decoded_len())),
            ])
        },
        |t| t.content.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_len_accounts_for_padding() {
        let thumb = |content: &str| Thumbnail {
            content_type: "image/jpeg".into(),
            content: content.into(),
        };
        assert_eq!(thumb("aGk=").decoded_len(), 2);
        assert_eq!(thumb("aGV5").decoded_len(), 3);
        assert_eq!(thumb("YQ==").decoded_len(), 1);
    }
}
