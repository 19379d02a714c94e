pub trait SnapshotSource {
    fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String>;
}

pub struct S3SnapshotSource {
    s3_client: aws_sdk_s3::Client,
}

impl S3SnapshotSource {
    pub fn new(s3_client: aws_sdk_s3::Client) -> Self {
        Self { s3_client }
    }
}

impl SnapshotSource for S3SnapshotSource {
    fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let bucket = bucket.to_string();
        let object_key = key.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let object = client
                    .get_object()
                    .bucket(bucket)
                    .key(object_key)
                    .send()
                    .await
                    .map_err(|error| {
                        format!(
                            "failed to read object from s3: {}",
                            aws_sdk_s3::error::DisplayErrorContext(&error)
                        )
                    })?;
                object
                    .body
                    .collect()
                    .await
                    .map(|bytes| bytes.into_bytes().to_vec())
                    .map_err(|error| format!("failed to read s3 object body: {error}"))
            })
        })
    }
}
